use std::time::Duration;

use tracing::warn;

use super::{action::Action, prompt::Prompt};
use crate::eval::context::{ScopeEnvironment, ScopeLevel};
use crate::eval::expression::Value;
use crate::event::handler::{EventHandlerTable, Handler};
use crate::session::Session;
use crate::InterpreterResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum InputMode {
    #[default]
    Voice,
    Dtmf,
}

/// Opaque reference handed to the recognizer. The interpreter never looks
/// inside a grammar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrammarRef {
    pub src: Option<String>,
    pub content: Option<String>,
    pub mode: InputMode,
}

impl GrammarRef {
    pub fn src<S: Into<String>>(src: S) -> Self {
        Self {
            src: Some(src.into()),
            ..Default::default()
        }
    }

    pub fn inline<S: Into<String>>(content: S, mode: InputMode) -> Self {
        Self {
            src: None,
            content: Some(content.into()),
            mode,
        }
    }
}

/// `<var name="..." expr="..."/>`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub expr: Option<String>,
}

impl VariableDecl {
    pub fn new<S: Into<String>>(name: S, expr: Option<&str>) -> Self {
        Self {
            name: name.into(),
            expr: expr.map(str::to_string),
        }
    }

    /// Evaluates the initializer against `chain` and declares the variable in
    /// `scope`.
    pub(crate) fn declare_in(
        &self,
        env: &mut dyn ScopeEnvironment,
        scope: ScopeLevel,
        chain: &[ScopeLevel],
    ) -> InterpreterResult<()> {
        let value = match &self.expr {
            Some(expr) => env.evaluate_expression(expr, chain)?,
            None => Value::Undefined,
        };
        env.declare(scope, &self.name, value);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormItemKind {
    Field {
        grammar: Option<GrammarRef>,
        timeout: Option<Duration>,
    },
    /// Runs its actions once, then counts as filled.
    Block,
    /// Collects form-level input before any field.
    Initial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormItem {
    pub name: String,
    /// Guard condition; the item is satisfied while this evaluates true.
    pub guard: Option<String>,
    /// Prompt tiers, indexed by the item's attempt counter.
    pub prompts: Vec<Prompt>,
    /// `<filled>` content for fields, the body of a `<block>`.
    pub actions: Vec<Action>,
    pub handlers: EventHandlerTable,
    pub kind: FormItemKind,
}

impl FormItem {
    fn new<S: Into<String>>(name: S, kind: FormItemKind) -> Self {
        Self {
            name: name.into(),
            guard: None,
            prompts: Vec::new(),
            actions: Vec::new(),
            handlers: EventHandlerTable::new(),
            kind,
        }
    }

    pub fn field<S: Into<String>>(name: S) -> Self {
        Self::new(
            name,
            FormItemKind::Field {
                grammar: None,
                timeout: None,
            },
        )
    }

    pub fn block<S: Into<String>>(name: S) -> Self {
        Self::new(name, FormItemKind::Block)
    }

    pub fn initial<S: Into<String>>(name: S) -> Self {
        Self::new(name, FormItemKind::Initial)
    }

    pub fn with_guard<S: Into<String>>(mut self, guard: S) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_handler(mut self, pattern: &str, actions: Vec<Action>) -> Self {
        self.handlers.add_handler(pattern, Handler::new(actions));
        self
    }

    pub fn with_grammar(mut self, grammar: GrammarRef) -> Self {
        if let FormItemKind::Field { grammar: slot, .. } = &mut self.kind {
            *slot = Some(grammar);
        }
        self
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, FormItemKind::Block)
    }

    /// Prompt for the given attempt; past the last tier the last prompt repeats.
    pub fn prompt_for_attempt(&self, attempts: u32) -> Option<&Prompt> {
        let last = self.prompts.len().checked_sub(1)?;
        self.prompts.get((attempts as usize).min(last))
    }

    pub fn grammars(&self) -> Vec<GrammarRef> {
        match &self.kind {
            FormItemKind::Field { grammar, .. } => grammar.iter().cloned().collect(),
            FormItemKind::Block | FormItemKind::Initial => Vec::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match &self.kind {
            FormItemKind::Field { timeout, .. } => *timeout,
            FormItemKind::Block | FormItemKind::Initial => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    pub id: String,
    pub items: Vec<FormItem>,
    pub variables: Vec<VariableDecl>,
    pub handlers: EventHandlerTable,
}

impl Form {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item: FormItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_variable(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    pub fn with_handler(mut self, pattern: &str, actions: Vec<Action>) -> Self {
        self.handlers.add_handler(pattern, Handler::new(actions));
        self
    }

    pub fn item_index(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    /// Resets per-item state and declares the dialog scope: one variable per
    /// form item, then the form's `<var>` declarations in order.
    pub fn start(&self, session: &mut Session) -> InterpreterResult<()> {
        session.begin_dialog(self.items.iter().map(|item| item.name.clone()));
        let env = session.scope_mut();
        env.clear_scope(ScopeLevel::Anonymous);
        env.clear_scope(ScopeLevel::Dialog);
        for item in &self.items {
            env.declare(ScopeLevel::Dialog, &item.name, Value::Undefined);
        }
        for decl in &self.variables {
            decl.declare_in(env, ScopeLevel::Dialog, &ScopeLevel::DIALOG_CHAIN)?;
        }
        Ok(())
    }

    /// Whether the item at `index` still needs no interpretation.
    pub fn is_satisfied(&self, session: &Session, index: usize) -> InterpreterResult<bool> {
        let filled = session.item_at(index).map(|s| s.filled).unwrap_or(false);
        if filled {
            return Ok(true);
        }
        match self.items.get(index).and_then(|item| item.guard.as_deref()) {
            Some(guard) => Ok(session
                .scope()
                .evaluate_condition(guard, &ScopeLevel::DIALOG_CHAIN)?),
            None => Ok(false),
        }
    }

    /// True iff no unsatisfied item remains. Guards that fail to evaluate
    /// count as unsatisfied.
    pub fn is_complete(&self, session: &Session) -> bool {
        (0..self.items.len()).all(|index| match self.is_satisfied(session, index) {
            Ok(satisfied) => satisfied,
            Err(e) => {
                warn!("guard of {} failed: {}", self.items[index].name, e);
                false
            }
        })
    }
}
