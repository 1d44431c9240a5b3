use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::eval::context::{ScopeEnvironment, ScopeLevel};
use crate::eval::expression::Value;
use crate::model::prompt::PromptQueue;

/// Mutable interpretation state of one form item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub name: String,
    pub value: Value,
    pub filled: bool,
    /// Unhandled noinput/nomatch/help events while this item was active.
    pub attempts: u32,
}

impl ItemState {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            value: Value::Undefined,
            filled: false,
            attempts: 0,
        }
    }

    /// Back to the unfilled state. Repeating it changes nothing.
    pub fn reset(&mut self) {
        self.value = Value::Undefined;
        self.filled = false;
        self.attempts = 0;
    }

    pub fn fill(&mut self, value: Value) {
        self.value = value;
        self.filled = true;
    }
}

/// Everything that changes during one call. Documents stay untouched; a
/// session owns its variable scopes, item states and active-item pointer.
pub struct Session {
    id: String,
    started_at: DateTime<Utc>,
    scope: Box<dyn ScopeEnvironment>,
    dialog_index: Option<usize>,
    items: Vec<ItemState>,
    active_item: Option<usize>,
    next_item: Option<usize>,
    pending_prompts: PromptQueue,
    suppress_prompts: bool,
    selected_choice: Option<usize>,
    collect_in_flight: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("dialog_index", &self.dialog_index)
            .field("items", &self.items)
            .field("active_item", &self.active_item)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(scope: Box<dyn ScopeEnvironment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            scope,
            dialog_index: None,
            items: Vec::new(),
            active_item: None,
            next_item: None,
            pending_prompts: PromptQueue::new(),
            suppress_prompts: false,
            selected_choice: None,
            collect_in_flight: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn scope(&self) -> &dyn ScopeEnvironment {
        self.scope.as_ref()
    }

    pub fn scope_mut(&mut self) -> &mut dyn ScopeEnvironment {
        self.scope.as_mut()
    }

    pub fn dialog_index(&self) -> Option<usize> {
        self.dialog_index
    }

    pub(crate) fn set_dialog_index(&mut self, index: usize) {
        self.dialog_index = Some(index);
    }

    /// Fresh item states for a dialog that is about to start.
    pub(crate) fn begin_dialog<I: IntoIterator<Item = String>>(&mut self, item_names: I) {
        self.items = item_names.into_iter().map(ItemState::new).collect();
        self.active_item = None;
        self.next_item = None;
        self.pending_prompts = PromptQueue::new();
        self.suppress_prompts = false;
        self.selected_choice = None;
        self.collect_in_flight = false;
    }

    pub fn items(&self) -> &[ItemState] {
        &self.items
    }

    pub fn item(&self, name: &str) -> Option<&ItemState> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn item_at(&self, index: usize) -> Option<&ItemState> {
        self.items.get(index)
    }

    pub(crate) fn item_at_mut(&mut self, index: usize) -> Option<&mut ItemState> {
        self.items.get_mut(index)
    }

    pub fn item_index(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    pub fn attempts(&self, name: &str) -> Option<u32> {
        self.item(name).map(|item| item.attempts)
    }

    pub fn active_item(&self) -> Option<usize> {
        self.active_item
    }

    pub fn active_item_name(&self) -> Option<&str> {
        self.active_item
            .and_then(|index| self.items.get(index))
            .map(|item| item.name.as_str())
    }

    /// Makes `index` the active item. Counters restart only when the active
    /// item actually changes. Returns whether it changed.
    pub(crate) fn activate(&mut self, index: usize) -> bool {
        if self.active_item == Some(index) {
            return false;
        }
        if let Some(previous) = self.active_item.and_then(|i| self.items.get_mut(i)) {
            previous.attempts = 0;
        }
        if let Some(item) = self.items.get_mut(index) {
            item.attempts = 0;
        }
        self.active_item = Some(index);
        self.suppress_prompts = false;
        true
    }

    pub(crate) fn deactivate(&mut self) {
        self.active_item = None;
    }

    pub(crate) fn increment_attempts(&mut self) -> Option<u32> {
        let item = self.active_item.and_then(|i| self.items.get_mut(i))?;
        item.attempts += 1;
        Some(item.attempts)
    }

    /// Fills an item and mirrors the value into its dialog variable.
    pub(crate) fn fill_item(&mut self, index: usize, value: Value) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        item.fill(value.clone());
        item.attempts = 0;
        let name = item.name.clone();
        if let Err(e) = self.scope.set(&[ScopeLevel::Dialog], &name, value) {
            warn!(item = %name, "could not store item value: {}", e);
        }
    }

    /// Resets an item and its dialog variable.
    pub(crate) fn clear_item(&mut self, index: usize) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        item.reset();
        let name = item.name.clone();
        if let Err(e) = self.scope.set(&[ScopeLevel::Dialog], &name, Value::Undefined) {
            warn!(item = %name, "could not clear item value: {}", e);
        }
        if self.active_item == Some(index) {
            self.active_item = None;
        }
    }

    pub(crate) fn take_next_item(&mut self) -> Option<usize> {
        self.next_item.take()
    }

    pub(crate) fn set_next_item(&mut self, index: usize) {
        self.next_item = Some(index);
    }

    pub fn pending_prompts(&self) -> &PromptQueue {
        &self.pending_prompts
    }

    pub(crate) fn queue_prompt(&mut self, prompt: String) {
        self.pending_prompts.push(prompt);
    }

    pub(crate) fn take_prompts(&mut self) -> PromptQueue {
        self.pending_prompts.take()
    }

    pub(crate) fn suppress_prompts(&mut self, suppress: bool) {
        self.suppress_prompts = suppress;
    }

    pub(crate) fn prompts_suppressed(&self) -> bool {
        self.suppress_prompts
    }

    pub fn selected_choice(&self) -> Option<usize> {
        self.selected_choice
    }

    pub(crate) fn select_choice(&mut self, index: usize) {
        self.selected_choice = Some(index);
    }

    pub fn collect_in_flight(&self) -> bool {
        self.collect_in_flight
    }

    pub(crate) fn set_collect_in_flight(&mut self, in_flight: bool) {
        self.collect_in_flight = in_flight;
    }
}
