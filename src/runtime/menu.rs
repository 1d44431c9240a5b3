use tracing::{debug, instrument};

use super::{collect, collect_prompts, flush_prompts, Collected, DialogContext, DialogOutcome};
use crate::config::InterpreterConfig;
use crate::eval::statement::ActionExecutor;
use crate::event::{EventReceiver, PlatformEvent, NOMATCH};
use crate::model::action::Action;
use crate::model::document::{Dialog, Document};
use crate::model::menu::Menu;
use crate::platform::{CollectRequest, Platform};
use crate::session::Session;
use crate::{InterpreterError, InterpreterResult};

/// Prompts for a choice and transitions to its target.
///
/// The menu is a single pseudo-item: unhandled noinput and nomatch count
/// attempts against it and select the next prompt tier.
pub struct MenuInterpreter<'a> {
    document: &'a Document,
    dialog: &'a Dialog,
    menu: &'a Menu,
    config: &'a InterpreterConfig,
}

impl<'a> MenuInterpreter<'a> {
    pub fn new(
        document: &'a Document,
        dialog: &'a Dialog,
        config: &'a InterpreterConfig,
    ) -> Option<Self> {
        match dialog {
            Dialog::Menu(menu) => Some(Self {
                document,
                dialog,
                menu,
                config,
            }),
            Dialog::Form(_) => None,
        }
    }

    #[instrument(skip_all, fields(menu = %self.menu.id, session = %session.id()))]
    pub async fn run(
        &self,
        session: &mut Session,
        platform: &Platform,
        events: &mut EventReceiver,
    ) -> InterpreterResult<DialogOutcome> {
        let outcome = self.run_loop(session, platform, events).await;
        session.set_collect_in_flight(false);
        session.deactivate();
        flush_prompts(session, platform).await;
        outcome
    }

    async fn run_loop(
        &self,
        session: &mut Session,
        platform: &Platform,
        events: &mut EventReceiver,
    ) -> InterpreterResult<DialogOutcome> {
        let context = DialogContext::new(self.document, self.dialog, self.config);
        session.activate(0);
        for _ in 0..self.config.max_iterations {
            let request = match self.collect_request(session) {
                Ok(request) => request,
                Err(event) => {
                    if let Some(outcome) = context.handle_event(session, None, event).outcome {
                        return Ok(outcome);
                    }
                    continue;
                }
            };
            let event = match collect(session, platform, events, request).await? {
                Collected::Recognized(value) => {
                    let utterance = value.to_string();
                    match self.menu.find_choice(&utterance) {
                        Some(index) => {
                            debug!(choice = %self.menu.choices[index].text, "choice selected");
                            session.select_choice(index);
                            let goto = [Action::Goto(self.menu.choices[index].next.clone())];
                            let flow = ActionExecutor::new(self.document).execute(&goto, session);
                            if let Some(outcome) = context.apply_flow(session, None, flow) {
                                return Ok(outcome);
                            }
                            continue;
                        }
                        None => PlatformEvent::new(NOMATCH).with_message(utterance),
                    }
                }
                Collected::Event(event) => event,
            };
            if let Some(outcome) = context.handle_event(session, None, event).outcome {
                return Ok(outcome);
            }
        }
        Err(InterpreterError::internal(format!(
            "menu {} did not finish within {} iterations",
            self.menu.id, self.config.max_iterations
        )))
    }

    fn collect_request(&self, session: &mut Session) -> Result<CollectRequest, PlatformEvent> {
        let attempts = session.attempts(&self.menu.id).unwrap_or_default();
        let prompts = collect_prompts(session, self.menu.prompt_for_attempt(attempts))?;
        Ok(CollectRequest {
            session_id: session.id().to_string(),
            item: self.menu.id.clone(),
            prompts,
            grammars: self.menu.choices.iter().flat_map(|c| c.grammars()).collect(),
            timeout: self.config.collect_timeout,
        })
    }
}
