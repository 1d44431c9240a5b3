//! Dialog drivers.
//!
//! [`form::FormInterpreter`] runs the form interpretation algorithm, and
//! [`menu::MenuInterpreter`] drives menus. Both share [`DialogContext`],
//! which resolves events through the item, dialog and document scopes and
//! runs the winning handler.

pub mod form;
pub mod menu;

pub use form::{FiaState, FormInterpreter};
pub use menu::MenuInterpreter;

use tracing::{debug, warn};

use crate::config::InterpreterConfig;
use crate::error::PlatformError;
use crate::eval::context::ScopeLevel;
use crate::eval::expression::Value;
use crate::eval::statement::{ActionExecutor, ControlFlow};
use crate::event::handler::EventHandlerTable;
use crate::event::{
    EventReceiver, PlatformEvent, ERROR_NORESOURCE, ERROR_SEMANTIC, EXIT, HANGUP, NOINPUT,
    NOMATCH,
};
use crate::model::action::GotoTarget;
use crate::model::document::{Dialog, Document};
use crate::model::prompt::{Prompt, PromptQueue};
use crate::platform::{CollectRequest, CollectResult, Platform};
use crate::session::Session;
use crate::InterpreterResult;

/// How a dialog handed control back to the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
    /// Every item satisfied; no transition requested.
    Complete,
    /// `goto next="#id"` or a menu choice.
    Transition(String),
    /// An event nobody handled, or `<exit>`.
    Terminated(PlatformEvent),
}

/// What became of one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventDisposition {
    /// Some handler in the scope chain caught the first event.
    pub resolved: bool,
    /// Set when the event (or what its handler did) ends the dialog.
    pub outcome: Option<DialogOutcome>,
}

pub struct DialogContext<'a> {
    pub document: &'a Document,
    pub dialog: &'a Dialog,
    pub config: &'a InterpreterConfig,
}

impl<'a> DialogContext<'a> {
    pub fn new(document: &'a Document, dialog: &'a Dialog, config: &'a InterpreterConfig) -> Self {
        Self {
            document,
            dialog,
            config,
        }
    }

    /// Resolves `event` starting at `item` (the active item's table, if any),
    /// runs the handler and follows whatever control flow it ends with.
    ///
    /// Unhandled noinput, nomatch and help count an attempt against the
    /// active item and let it collect again with its next prompt. Any other
    /// unhandled event terminates the dialog.
    pub fn handle_event(
        &self,
        session: &mut Session,
        item: Option<&'a EventHandlerTable>,
        event: PlatformEvent,
    ) -> EventDisposition {
        self.dispatch(session, item, event, 0)
    }

    /// Applies the control flow that ended a block, filled actions or a
    /// handler.
    pub fn apply_flow(
        &self,
        session: &mut Session,
        item: Option<&'a EventHandlerTable>,
        flow: ControlFlow,
    ) -> Option<DialogOutcome> {
        self.follow(session, item, flow, 0)
    }

    fn follow(
        &self,
        session: &mut Session,
        item: Option<&'a EventHandlerTable>,
        flow: ControlFlow,
        depth: usize,
    ) -> Option<DialogOutcome> {
        match flow {
            ControlFlow::Continue => None,
            ControlFlow::Goto(GotoTarget::Item(name)) => {
                if let Some(index) = session.item_index(&name) {
                    session.set_next_item(index);
                }
                None
            }
            ControlFlow::Goto(GotoTarget::Dialog(id)) => Some(DialogOutcome::Transition(id)),
            ControlFlow::Exit => Some(DialogOutcome::Terminated(PlatformEvent::new(EXIT))),
            ControlFlow::Throw(event) => self.dispatch(session, item, event, depth).outcome,
        }
    }

    fn dispatch(
        &self,
        session: &mut Session,
        item: Option<&'a EventHandlerTable>,
        event: PlatformEvent,
        depth: usize,
    ) -> EventDisposition {
        if depth > self.config.max_event_depth {
            warn!(event = %event.name, depth, "event thrown too deep inside handlers");
            return EventDisposition {
                resolved: false,
                outcome: Some(DialogOutcome::Terminated(event)),
            };
        }

        let mut chain: Vec<&EventHandlerTable> = Vec::with_capacity(3);
        chain.extend(item);
        chain.push(self.dialog.handlers());
        chain.push(&self.document.handlers);

        match EventHandlerTable::resolve(&chain, &event.name) {
            Ok(resolution) => {
                debug!(
                    event = %event.name,
                    pattern = %resolution.pattern,
                    scope = resolution.depth,
                    "handler selected"
                );
                ActionExecutor::enter_handler(session, &event);
                session.suppress_prompts(true);
                let flow =
                    ActionExecutor::new(self.document).execute(&resolution.handler.actions, session);
                EventDisposition {
                    resolved: true,
                    outcome: self.follow(session, item, flow, depth + 1),
                }
            }
            Err(_) if event.category().is_recoverable() => {
                let attempts = session.increment_attempts();
                debug!(event = %event.name, ?attempts, "unhandled, reprompting");
                session.suppress_prompts(false);
                EventDisposition::default()
            }
            Err(_) => {
                debug!(event = %event.name, "unhandled, terminating dialog");
                EventDisposition {
                    resolved: false,
                    outcome: Some(DialogOutcome::Terminated(event)),
                }
            }
        }
    }
}

/// Routes an event that arrived while no collect was running into the
/// session's current dialog.
pub fn deliver_event(
    document: &Document,
    config: &InterpreterConfig,
    session: &mut Session,
    event: PlatformEvent,
) -> EventDisposition {
    let Some(dialog) = session.dialog_index().and_then(|i| document.dialog(i)) else {
        return EventDisposition {
            resolved: false,
            outcome: Some(DialogOutcome::Terminated(event)),
        };
    };
    let item = dialog
        .as_form()
        .zip(session.active_item())
        .and_then(|(form, index)| form.items.get(index))
        .map(|item| &item.handlers);
    DialogContext::new(document, dialog, config).handle_event(session, item, event)
}

/// Queued prompts followed by `tier`, the active item's prompt for its
/// current attempt. The tier is skipped once after a handler that did not
/// reprompt.
pub(crate) fn collect_prompts(
    session: &mut Session,
    tier: Option<&Prompt>,
) -> Result<PromptQueue, PlatformEvent> {
    let mut prompts = session.take_prompts();
    if !session.prompts_suppressed() {
        if let Some(prompt) = tier {
            let text = prompt
                .render(session.scope(), &ScopeLevel::DIALOG_CHAIN)
                .map_err(|e| PlatformEvent::new(ERROR_SEMANTIC).with_message(e.to_string()))?;
            prompts.push(text);
        }
    }
    session.suppress_prompts(false);
    Ok(prompts)
}

/// Outcome of one collect, with everything but recognition turned into the
/// event to process.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Collected {
    Recognized(Value),
    Event(PlatformEvent),
}

/// Issues `request` and races it against externally delivered events. An
/// event that arrives first drops the collect and is returned instead.
pub(crate) async fn collect(
    session: &mut Session,
    platform: &Platform,
    events: &mut EventReceiver,
    request: CollectRequest,
) -> InterpreterResult<Collected> {
    if session.collect_in_flight() {
        return Err(PlatformError::CollectPending {
            session_id: session.id().to_string(),
        }
        .into());
    }
    let item = request.item.clone();
    session.set_collect_in_flight(true);
    let input = tokio::select! {
        biased;
        Some(event) = events.recv() => Err(event),
        result = platform.collector.begin_collect(request) => Ok(result),
    };
    session.set_collect_in_flight(false);

    let event = match input {
        Ok(Ok(CollectResult::Recognized(value))) => {
            debug!(%item, %value, "recognized");
            return Ok(Collected::Recognized(value));
        }
        Ok(Ok(CollectResult::NoInput)) => PlatformEvent::new(NOINPUT),
        Ok(Ok(CollectResult::NoMatch)) => PlatformEvent::new(NOMATCH),
        Ok(Ok(CollectResult::Hangup)) => PlatformEvent::new(HANGUP),
        Ok(Ok(CollectResult::Event { name, message })) => PlatformEvent { name, message },
        Ok(Err(e)) => {
            warn!(%item, "collect failed: {}", e);
            PlatformEvent::new(ERROR_NORESOURCE).with_message(e.to_string())
        }
        Err(event) => {
            debug!(%item, event = %event.name, "collect superseded by external event");
            event
        }
    };
    Ok(Collected::Event(event))
}

/// Plays whatever prompts are still queued. A playback failure is logged and
/// does not change how the dialog ended.
pub(crate) async fn flush_prompts(session: &mut Session, platform: &Platform) {
    let prompts = session.take_prompts();
    if prompts.is_empty() {
        return;
    }
    if let Err(e) = platform.player.play(&prompts).await {
        warn!(session = session.id(), "playing final prompts failed: {}", e);
    }
}
