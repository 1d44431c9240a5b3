use tracing::{debug, instrument, warn};

use super::{collect, collect_prompts, flush_prompts, Collected, DialogContext, DialogOutcome};
use crate::config::InterpreterConfig;
use crate::eval::context::ScopeLevel;
use crate::eval::expression::Value;
use crate::eval::statement::ActionExecutor;
use crate::event::{EventReceiver, PlatformEvent, ERROR_SEMANTIC};
use crate::model::document::{Dialog, Document};
use crate::model::form::{Form, FormItem};
use crate::platform::{CollectRequest, Platform};
use crate::session::Session;
use crate::{InterpreterError, InterpreterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum FiaState {
    #[default]
    Initializing,
    Selecting,
    Collecting,
    Processing,
    Complete,
    Failed,
}

/// Drives one form through select → collect → process until it completes,
/// transitions or fails.
pub struct FormInterpreter<'a> {
    document: &'a Document,
    dialog: &'a Dialog,
    form: &'a Form,
    config: &'a InterpreterConfig,
    state: FiaState,
}

impl<'a> FormInterpreter<'a> {
    /// `None` if `dialog` is not a form.
    pub fn new(
        document: &'a Document,
        dialog: &'a Dialog,
        config: &'a InterpreterConfig,
    ) -> Option<Self> {
        let form = dialog.as_form()?;
        Some(Self {
            document,
            dialog,
            form,
            config,
            state: FiaState::Initializing,
        })
    }

    pub fn state(&self) -> FiaState {
        self.state
    }

    fn context(&self) -> DialogContext<'a> {
        DialogContext::new(self.document, self.dialog, self.config)
    }

    /// Pending `goto nextitem` first, then the first unsatisfied item in
    /// declaration order.
    pub fn select(&self, session: &mut Session) -> InterpreterResult<Option<usize>> {
        if let Some(next) = session.take_next_item() {
            return Ok(Some(next));
        }
        for index in 0..self.form.items.len() {
            if !self.form.is_satisfied(session, index)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(form = %self.form.id, session = %session.id()))]
    pub async fn run(
        &mut self,
        session: &mut Session,
        platform: &Platform,
        events: &mut EventReceiver,
    ) -> InterpreterResult<DialogOutcome> {
        let outcome = self.run_loop(session, platform, events).await;
        session.set_collect_in_flight(false);
        session.deactivate();
        match &outcome {
            Ok(DialogOutcome::Complete) | Ok(DialogOutcome::Transition(_)) => {
                self.state = FiaState::Complete
            }
            Ok(DialogOutcome::Terminated(_)) | Err(_) => self.state = FiaState::Failed,
        }
        flush_prompts(session, platform).await;
        outcome
    }

    async fn run_loop(
        &mut self,
        session: &mut Session,
        platform: &Platform,
        events: &mut EventReceiver,
    ) -> InterpreterResult<DialogOutcome> {
        let context = self.context();
        for _ in 0..self.config.max_iterations {
            self.state = FiaState::Selecting;
            let index = match self.select(session) {
                Ok(Some(index)) => index,
                Ok(None) => {
                    debug!("all items satisfied");
                    return Ok(DialogOutcome::Complete);
                }
                Err(e) => {
                    warn!("item selection failed: {}", e);
                    let event = PlatformEvent::new(ERROR_SEMANTIC).with_message(e.to_string());
                    if let Some(outcome) = context.handle_event(session, None, event).outcome {
                        return Ok(outcome);
                    }
                    continue;
                }
            };
            let item = self
                .form
                .items
                .get(index)
                .ok_or_else(|| InterpreterError::internal(format!("no item at {}", index)))?;
            if session.activate(index) {
                debug!(item = %item.name, "selected");
            }

            if item.is_block() {
                self.state = FiaState::Processing;
                session.fill_item(index, Value::Boolean(true));
                if let Some(outcome) = self.run_item_actions(session, item) {
                    return Ok(outcome);
                }
                continue;
            }

            self.state = FiaState::Collecting;
            let request = match self.collect_request(session, item) {
                Ok(request) => request,
                Err(event) => {
                    if let Some(outcome) =
                        context.handle_event(session, Some(&item.handlers), event).outcome
                    {
                        return Ok(outcome);
                    }
                    continue;
                }
            };
            let collected = collect(session, platform, events, request).await?;

            self.state = FiaState::Processing;
            let event = match collected {
                Collected::Recognized(value) => {
                    session.fill_item(index, value);
                    if let Some(outcome) = self.run_item_actions(session, item) {
                        return Ok(outcome);
                    }
                    continue;
                }
                Collected::Event(event) => event,
            };
            if let Some(outcome) = context
                .handle_event(session, Some(&item.handlers), event)
                .outcome
            {
                return Ok(outcome);
            }
        }
        Err(InterpreterError::internal(format!(
            "form {} did not finish within {} iterations",
            self.form.id, self.config.max_iterations
        )))
    }

    /// Runs a block body or a field's filled actions in a fresh anonymous
    /// scope.
    fn run_item_actions(&self, session: &mut Session, item: &'a FormItem) -> Option<DialogOutcome> {
        if item.actions.is_empty() {
            return None;
        }
        session.scope_mut().clear_scope(ScopeLevel::Anonymous);
        let flow = ActionExecutor::new(self.document).execute(&item.actions, session);
        self.context().apply_flow(session, Some(&item.handlers), flow)
    }

    fn collect_request(
        &self,
        session: &mut Session,
        item: &FormItem,
    ) -> Result<CollectRequest, PlatformEvent> {
        let attempts = session.attempts(&item.name).unwrap_or_default();
        let prompts = collect_prompts(session, item.prompt_for_attempt(attempts))?;
        Ok(CollectRequest {
            session_id: session.id().to_string(),
            item: item.name.clone(),
            prompts,
            grammars: item.grammars(),
            timeout: item.timeout().unwrap_or(self.config.collect_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::context::ScriptContext;
    use crate::event::{channel, ERROR_NORESOURCE, NOINPUT};
    use crate::model::action::Action;
    use crate::model::prompt::Prompt;
    use crate::platform::{
        CollectResult, MockCollector, MockPlayer, ScriptedCollector, TracingPlayer,
    };
    use std::sync::Arc;

    fn start(document: &Document) -> Session {
        let mut session = Session::new(Box::new(ScriptContext::new()));
        document.declare_variables(&mut session).unwrap();
        document.dialog(0).unwrap().start(&mut session).unwrap();
        session.set_dialog_index(0);
        session
    }

    fn platform(results: Vec<CollectResult>) -> (Platform, Arc<ScriptedCollector>, Arc<TracingPlayer>) {
        let collector = Arc::new(ScriptedCollector::new(results));
        let player = Arc::new(TracingPlayer::new());
        (
            Platform::new(collector.clone(), player.clone()),
            collector,
            player,
        )
    }

    #[tokio::test]
    async fn test_selection_respects_guards() {
        let document = Document::new("t").with_dialog(
            Form::new("f")
                .with_item(FormItem::field("a").with_guard("true"))
                .with_item(FormItem::field("b")),
        );
        let session = &mut start(&document);
        let config = InterpreterConfig::default();
        let dialog = document.dialog(0).unwrap();
        let fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        assert_eq!(fia.select(session).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_block_then_field_then_complete() {
        let document = Document::new("t").with_dialog(
            Form::new("f")
                .with_item(
                    FormItem::block("intro").with_action(Action::Prompt(Prompt::text("Welcome."))),
                )
                .with_item(
                    FormItem::field("drink")
                        .with_prompt(Prompt::text("Coffee or tea?"))
                        .with_action(Action::Prompt(
                            Prompt::text("One ").with_value("drink").with_text(" coming up."),
                        )),
                ),
        );
        let mut session = start(&document);
        let config = InterpreterConfig::default();
        let (platform, collector, player) =
            platform(vec![CollectResult::Recognized(Value::from("tea"))]);
        let (_tx, mut rx) = channel::channel(4);

        let dialog = document.dialog(0).unwrap();
        let mut fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        let outcome = fia.run(&mut session, &platform, &mut rx).await.unwrap();

        assert_eq!(outcome, DialogOutcome::Complete);
        assert_eq!(fia.state(), FiaState::Complete);
        let requests = collector.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].prompts.as_slice(),
            &["Welcome.".to_string(), "Coffee or tea?".to_string()]
        );
        assert_eq!(player.played().await, vec!["One tea coming up."]);
    }

    #[tokio::test]
    async fn test_collector_failure_becomes_noresource() {
        let document = Document::new("t").with_dialog(
            Form::new("f")
                .with_item(FormItem::field("a"))
                .with_handler(ERROR_NORESOURCE, vec![Action::Exit]),
        );
        let mut session = start(&document);
        let config = InterpreterConfig::default();
        let mut collector = MockCollector::new();
        collector.expect_begin_collect().times(1).returning(|_| {
            Err(crate::error::PlatformError::CollectFailed(
                "recognizer offline".to_string(),
            ))
        });
        let platform = Platform::new(Arc::new(collector), Arc::new(TracingPlayer::new()));
        let (_tx, mut rx) = channel::channel(4);

        let dialog = document.dialog(0).unwrap();
        let mut fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        let outcome = fia.run(&mut session, &platform, &mut rx).await.unwrap();
        assert_eq!(outcome, DialogOutcome::Terminated(PlatformEvent::new("exit")));
        assert_eq!(fia.state(), FiaState::Failed);
    }

    #[tokio::test]
    async fn test_iteration_bound() {
        let document = Document::new("t").with_dialog(
            Form::new("f").with_item(FormItem::field("a")).with_handler(NOINPUT, vec![]),
        );
        let mut session = start(&document);
        let config = InterpreterConfig {
            max_iterations: 5,
            ..Default::default()
        };
        let (platform, _, _) = platform(vec![CollectResult::NoInput; 10]);
        let (_tx, mut rx) = channel::channel(4);

        let dialog = document.dialog(0).unwrap();
        let mut fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        let result = fia.run(&mut session, &platform, &mut rx).await;
        assert!(matches!(result, Err(InterpreterError::Internal(_))));
    }

    #[tokio::test]
    async fn test_pending_event_supersedes_collect() {
        let document = Document::new("t").with_dialog(Form::new("f").with_item(FormItem::field("a")));
        let mut session = start(&document);
        let config = InterpreterConfig::default();
        let (platform, collector, _) =
            platform(vec![CollectResult::Recognized(Value::from("ignored"))]);
        let (tx, mut rx) = channel::channel(4);
        tx.send("com.example.transfer", None).await.unwrap();

        let dialog = document.dialog(0).unwrap();
        let mut fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        let outcome = fia.run(&mut session, &platform, &mut rx).await.unwrap();
        assert_eq!(
            outcome,
            DialogOutcome::Terminated(PlatformEvent::new("com.example.transfer"))
        );
        assert!(!session.item("a").unwrap().filled);
        assert_eq!(collector.remaining().await, 1);
    }

    #[tokio::test]
    async fn test_playback_failure_keeps_outcome() {
        let document = Document::new("t").with_dialog(Form::new("f").with_item(
            FormItem::block("bye").with_action(Action::Prompt(Prompt::text("Goodbye."))),
        ));
        let mut session = start(&document);
        let config = InterpreterConfig::default();
        let mut player = MockPlayer::new();
        player.expect_play().times(1).returning(|_| {
            Err(crate::error::PlatformError::PlaybackFailed(
                "speaker unplugged".to_string(),
            ))
        });
        let platform = Platform::new(Arc::new(ScriptedCollector::default()), Arc::new(player));
        let (_tx, mut rx) = channel::channel(4);

        let dialog = document.dialog(0).unwrap();
        let mut fia = FormInterpreter::new(&document, dialog, &config).unwrap();
        let outcome = fia.run(&mut session, &platform, &mut rx).await.unwrap();

        assert_eq!(outcome, DialogOutcome::Complete);
        assert_eq!(fia.state(), FiaState::Complete);
    }
}
