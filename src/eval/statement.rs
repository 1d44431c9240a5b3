use tracing::{debug, info};

use super::context::{ScopeLevel, ScriptError};
use super::expression::Value;
use crate::event::{PlatformEvent, ERROR_BADFETCH, ERROR_SEMANTIC, HANGUP};
use crate::model::action::{Action, ConditionalBranch, GotoTarget};
use crate::model::document::Document;
use crate::model::form::VariableDecl;
use crate::model::prompt::Prompt;
use crate::session::Session;

/// How a run of executable content ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    /// Fell off the end; the FIA carries on.
    Continue,
    /// `<goto>` to a dialog of the document or an item of the current form.
    Goto(GotoTarget),
    /// `<throw>`, `<disconnect>` or a failure turned into an event.
    Throw(PlatformEvent),
    /// `<exit>`
    Exit,
}

impl ControlFlow {
    pub fn is_continue(&self) -> bool {
        matches!(self, ControlFlow::Continue)
    }
}

/// Runs [`Action`] lists against a session.
///
/// Everything executes with the handler chain (anonymous, dialog,
/// document). Script errors never escape: they become `error.semantic`, and
/// a goto to an unknown target becomes `error.badfetch`.
pub struct ActionExecutor<'a> {
    document: &'a Document,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Prepares the anonymous scope of an event handler.
    pub fn enter_handler(session: &mut Session, event: &PlatformEvent) {
        let env = session.scope_mut();
        env.clear_scope(ScopeLevel::Anonymous);
        env.declare(ScopeLevel::Anonymous, "_event", Value::from(event.name.as_str()));
        env.declare(
            ScopeLevel::Anonymous,
            "_message",
            event.message.clone().unwrap_or_default(),
        );
    }

    pub fn execute(&self, actions: &[Action], session: &mut Session) -> ControlFlow {
        for action in actions {
            let flow = self.execute_action(action, session);
            if !flow.is_continue() {
                return flow;
            }
        }
        ControlFlow::Continue
    }

    fn execute_action(&self, action: &Action, session: &mut Session) -> ControlFlow {
        match action {
            Action::Assign { name, expr } => self.exec_assign(name, expr, session),
            Action::Var { name, expr } => {
                let decl = VariableDecl::new(name.as_str(), expr.as_deref());
                match decl.declare_in(
                    session.scope_mut(),
                    ScopeLevel::Anonymous,
                    &ScopeLevel::HANDLER_CHAIN,
                ) {
                    Ok(()) => ControlFlow::Continue,
                    Err(e) => semantic_error(e.to_string()),
                }
            }
            Action::Clear { names } => self.exec_clear(names, session),
            Action::Prompt(prompt) => match render(prompt, session) {
                Ok(text) => {
                    session.queue_prompt(text);
                    ControlFlow::Continue
                }
                Err(e) => semantic_error(e.to_string()),
            },
            Action::Reprompt => {
                session.suppress_prompts(false);
                ControlFlow::Continue
            }
            Action::Goto(target) => self.exec_goto(target, session),
            Action::Throw { event, message } => {
                let mut event = PlatformEvent::new(event.as_str());
                if let Some(message) = message {
                    event = event.with_message(message.as_str());
                }
                ControlFlow::Throw(event)
            }
            Action::Exit => ControlFlow::Exit,
            Action::Disconnect => ControlFlow::Throw(PlatformEvent::new(HANGUP)),
            Action::Log(prompt) => match render(prompt, session) {
                Ok(text) => {
                    info!(target: "vxml::log", session = session.id(), "{}", text);
                    ControlFlow::Continue
                }
                Err(e) => semantic_error(e.to_string()),
            },
            Action::If {
                branches,
                otherwise,
            } => self.exec_if(branches, otherwise, session),
        }
    }

    fn exec_assign(&self, name: &str, expr: &str, session: &mut Session) -> ControlFlow {
        let value = match session
            .scope()
            .evaluate_expression(expr, &ScopeLevel::HANDLER_CHAIN)
        {
            Ok(value) => value,
            Err(e) => return semantic_error(e.to_string()),
        };
        let written = session
            .scope_mut()
            .set(&ScopeLevel::HANDLER_CHAIN, name, value.clone());
        match written {
            Ok(ScopeLevel::Dialog) => {
                // Assigning a form item's variable fills the item.
                if let Some(item) = session
                    .item_index(name)
                    .and_then(|index| session.item_at_mut(index))
                {
                    if value.is_undefined() {
                        item.reset();
                    } else {
                        item.fill(value);
                    }
                }
                ControlFlow::Continue
            }
            Ok(_) => ControlFlow::Continue,
            Err(e) => semantic_error(e.to_string()),
        }
    }

    fn exec_clear(&self, names: &[String], session: &mut Session) -> ControlFlow {
        if names.is_empty() {
            for index in 0..session.items().len() {
                session.clear_item(index);
            }
            return ControlFlow::Continue;
        }
        for name in names {
            if let Some(index) = session.item_index(name) {
                session.clear_item(index);
                continue;
            }
            if let Err(e) =
                session
                    .scope_mut()
                    .set(&ScopeLevel::HANDLER_CHAIN, name, Value::Undefined)
            {
                return semantic_error(e.to_string());
            }
        }
        ControlFlow::Continue
    }

    fn exec_goto(&self, target: &GotoTarget, session: &Session) -> ControlFlow {
        let known = match target {
            GotoTarget::Dialog(id) => self.document.dialog_index(id).is_some(),
            GotoTarget::Item(name) => session.item_index(name).is_some(),
        };
        if known {
            debug!("goto {:?}", target);
            ControlFlow::Goto(target.clone())
        } else {
            let missing = match target {
                GotoTarget::Dialog(id) => format!("#{}", id),
                GotoTarget::Item(name) => name.clone(),
            };
            ControlFlow::Throw(
                PlatformEvent::new(ERROR_BADFETCH).with_message(format!("unknown target {}", missing)),
            )
        }
    }

    fn exec_if(
        &self,
        branches: &[ConditionalBranch],
        otherwise: &[Action],
        session: &mut Session,
    ) -> ControlFlow {
        for branch in branches {
            match session
                .scope()
                .evaluate_condition(&branch.cond, &ScopeLevel::HANDLER_CHAIN)
            {
                Ok(true) => return self.execute(&branch.actions, session),
                Ok(false) => continue,
                Err(e) => return semantic_error(e.to_string()),
            }
        }
        self.execute(otherwise, session)
    }
}

fn render(prompt: &Prompt, session: &Session) -> Result<String, ScriptError> {
    prompt.render(session.scope(), &ScopeLevel::HANDLER_CHAIN)
}

fn semantic_error(message: String) -> ControlFlow {
    ControlFlow::Throw(PlatformEvent::new(ERROR_SEMANTIC).with_message(message))
}
