use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::InterpreterConfig;
use crate::error::StatusCode;
use crate::eval::context::{ScopeEnvironment, ScriptContext};
use crate::eval::expression::Value;
use crate::event::channel::{self, EventReceiver, EventSender};
use crate::event::PlatformEvent;
use crate::model::document::{Dialog, Document};
use crate::parser::DocumentParser;
use crate::platform::Platform;
use crate::runtime::{self, DialogOutcome, FormInterpreter, MenuInterpreter};
use crate::session::Session;
use crate::{InterpreterError, InterpreterResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
pub enum InterpreterState {
    #[default]
    Idle,
    Loading,
    Initializing,
    DialogActive,
    Transitioning,
    Error,
    Complete,
}

/// Builds the variable environment of each new session.
pub type ScopeFactory = Arc<dyn Fn() -> Box<dyn ScopeEnvironment> + Send + Sync>;

/// Top-level session state machine.
///
/// ```text
/// Idle ──load_document──▶ Loading ──▶ Initializing ──initialize──▶ DialogActive
///                            │                                        │  ▲
///                            ▼                                   run  ▼  │ goto / next dialog
///                          Error ◀──── unhandled error/custom ── Transitioning
///                                                                     │
///                          Complete ◀── last dialog done/hangup/exit ─┘
/// ```
///
/// A form that completes without a `goto` hands over to the next dialog in
/// document order; the session completes after the last one.
///
/// Calling an operation outside its valid states returns
/// [`InterpreterError::InvalidState`] and leaves the state machine as it was;
/// only [`Interpreter::last_status`] records the rejection.
pub struct Interpreter {
    config: InterpreterConfig,
    parser: Arc<dyn DocumentParser>,
    platform: Platform,
    scope_factory: ScopeFactory,
    state: InterpreterState,
    document: Option<Arc<Document>>,
    session: Option<Session>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    last_status: StatusCode,
}

impl Interpreter {
    pub fn new(parser: Arc<dyn DocumentParser>, platform: Platform) -> Self {
        let config = InterpreterConfig::default();
        let (events_tx, events_rx) = channel::channel(config.event_buffer_size);
        Self {
            config,
            parser,
            platform,
            scope_factory: Arc::new(|| Box::new(ScriptContext::new()) as Box<dyn ScopeEnvironment>),
            state: InterpreterState::Idle,
            document: None,
            session: None,
            events_tx,
            events_rx,
            last_status: StatusCode::Success,
        }
    }

    /// Replaces the configuration. Senders handed out earlier stop working.
    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        let (events_tx, events_rx) = channel::channel(config.event_buffer_size);
        self.events_tx = events_tx;
        self.events_rx = events_rx;
        self.config = config;
        self
    }

    pub fn with_scope_factory(mut self, factory: ScopeFactory) -> Self {
        self.scope_factory = factory;
        self
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    /// Status of the most recent operation.
    pub fn last_status(&self) -> StatusCode {
        self.last_status
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            InterpreterState::Complete | InterpreterState::Error
        )
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        self.document.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Sender for events delivered while `run` is waiting on a collect.
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Drops document and session and returns to `Idle`.
    pub fn reset(&mut self) {
        self.events_rx.drain();
        self.document = None;
        self.session = None;
        self.state = InterpreterState::Idle;
        self.last_status = StatusCode::Success;
    }

    fn require(
        &mut self,
        operation: &'static str,
        valid: &[InterpreterState],
    ) -> InterpreterResult<()> {
        if valid.contains(&self.state) {
            return Ok(());
        }
        warn!(operation, state = %self.state, "operation rejected");
        self.last_status = StatusCode::InvalidState;
        Err(InterpreterError::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn fail(&mut self, error: InterpreterError) -> InterpreterError {
        warn!("interpreter failed: {}", error);
        self.state = InterpreterState::Error;
        self.last_status = error.status_code();
        error
    }

    #[instrument(skip(self))]
    pub async fn load_document(&mut self, uri: &str) -> InterpreterResult<()> {
        self.require("load_document", &[InterpreterState::Idle, InterpreterState::Complete])?;
        self.state = InterpreterState::Loading;
        self.document = None;
        self.session = None;

        match self.parser.parse(uri).await {
            Ok(document) => {
                info!(dialogs = document.dialogs.len(), "document loaded");
                self.document = Some(document);
                self.state = InterpreterState::Initializing;
                self.last_status = StatusCode::Success;
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Creates the session and starts the first dialog.
    #[instrument(skip(self))]
    pub fn initialize(&mut self) -> InterpreterResult<()> {
        self.require("initialize", &[InterpreterState::Initializing])?;
        let document = match self.document.clone() {
            Some(document) => document,
            None => return Err(self.fail(InterpreterError::internal("no document loaded"))),
        };
        if document.dialogs.is_empty() {
            return Err(self.fail(InterpreterError::NoMoreDialogs));
        }

        let mut session = Session::new((self.scope_factory)());
        let dropped = self.events_rx.drain();
        if dropped > 0 {
            debug!(dropped, "discarded stale events");
        }
        let started = document
            .declare_variables(&mut session)
            .and_then(|_| start_dialog(&document, &mut session, 0));
        if let Err(e) = started {
            return Err(self.fail(e));
        }
        info!(session = session.id(), "session started");
        self.session = Some(session);
        self.state = InterpreterState::DialogActive;
        self.last_status = StatusCode::Success;
        Ok(())
    }

    /// Runs dialogs until the session completes or fails. Interaction
    /// outcomes such as a hangup come back as `Ok` with their status code.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> InterpreterResult<StatusCode> {
        self.require(
            "run",
            &[InterpreterState::DialogActive, InterpreterState::Transitioning],
        )?;
        let (document, mut session) = match (self.document.clone(), self.session.take()) {
            (Some(document), Some(session)) => (document, session),
            _ => return Err(self.fail(InterpreterError::internal("no active session"))),
        };

        let result = self.drive(&document, &mut session).await;
        self.session = Some(session);
        match result {
            Ok(status) => {
                info!(%status, "session complete");
                self.state = InterpreterState::Complete;
                self.last_status = status;
                Ok(status)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn drive(
        &mut self,
        document: &Document,
        session: &mut Session,
    ) -> InterpreterResult<StatusCode> {
        for _ in 0..self.config.max_iterations {
            let dialog = session
                .dialog_index()
                .and_then(|index| document.dialog(index))
                .ok_or_else(|| InterpreterError::internal("session has no active dialog"))?;
            self.state = InterpreterState::DialogActive;

            let outcome = match dialog {
                Dialog::Form(_) => {
                    let mut fia = FormInterpreter::new(document, dialog, &self.config)
                        .ok_or_else(|| InterpreterError::internal("dialog is not a form"))?;
                    fia.run(session, &self.platform, &mut self.events_rx)
                        .await?
                }
                Dialog::Menu(_) => {
                    MenuInterpreter::new(document, dialog, &self.config)
                        .ok_or_else(|| InterpreterError::internal("dialog is not a menu"))?
                        .run(session, &self.platform, &mut self.events_rx)
                        .await?
                }
            };

            match outcome {
                DialogOutcome::Complete => match following_dialog(document, session) {
                    Some(index) => {
                        self.state = InterpreterState::Transitioning;
                        start_dialog(document, session, index)?;
                    }
                    None => return Ok(StatusCode::Success),
                },
                DialogOutcome::Transition(target) => {
                    self.state = InterpreterState::Transitioning;
                    let index = document
                        .dialog_index(&target)
                        .ok_or(InterpreterError::InvalidTransition { target })?;
                    start_dialog(document, session, index)?;
                }
                DialogOutcome::Terminated(event) => return terminal_status(event),
            }
        }
        Err(InterpreterError::internal(format!(
            "no final dialog after {} transitions",
            self.config.max_iterations
        )))
    }

    /// Routes an event into the active dialog while `run` is not executing.
    /// Returns whether a handler caught it.
    #[instrument(skip(self, data))]
    pub fn handle_event(&mut self, name: &str, data: Option<Value>) -> InterpreterResult<bool> {
        self.require(
            "handle_event",
            &[InterpreterState::DialogActive, InterpreterState::Transitioning],
        )?;
        let (document, mut session) = match (self.document.clone(), self.session.take()) {
            (Some(document), Some(session)) => (document, session),
            _ => return Err(self.fail(InterpreterError::internal("no active session"))),
        };
        let event = PlatformEvent {
            name: name.to_string(),
            message: data,
        };
        let category = event.category();
        let disposition = runtime::deliver_event(&document, &self.config, &mut session, event);
        let transition = match &disposition.outcome {
            Some(DialogOutcome::Transition(target)) => Some(match document.dialog_index(target) {
                Some(index) => start_dialog(&document, &mut session, index),
                None => Err(InterpreterError::InvalidTransition {
                    target: target.clone(),
                }),
            }),
            Some(DialogOutcome::Complete) => following_dialog(&document, &session)
                .map(|index| start_dialog(&document, &mut session, index)),
            _ => None,
        };
        self.session = Some(session);

        match disposition.outcome {
            None => {
                self.last_status = if disposition.resolved {
                    StatusCode::Success
                } else {
                    category.status_code()
                };
                Ok(disposition.resolved)
            }
            Some(DialogOutcome::Complete) | Some(DialogOutcome::Transition(_)) => {
                match transition {
                    Some(Err(e)) => return Err(self.fail(e)),
                    Some(Ok(())) => self.state = InterpreterState::Transitioning,
                    None => self.state = InterpreterState::Complete,
                }
                self.last_status = StatusCode::Success;
                Ok(disposition.resolved)
            }
            Some(DialogOutcome::Terminated(event)) => match terminal_status(event) {
                Ok(status) => {
                    self.state = InterpreterState::Complete;
                    self.last_status = status;
                    Ok(disposition.resolved)
                }
                Err(e) => Err(self.fail(e)),
            },
        }
    }
}

fn start_dialog(document: &Document, session: &mut Session, index: usize) -> InterpreterResult<()> {
    let dialog = document
        .dialog(index)
        .ok_or(InterpreterError::NoMoreDialogs)?;
    debug!(dialog = dialog.id(), "starting dialog");
    session.set_dialog_index(index);
    dialog.start(session)
}

/// The dialog after the active one in document order, if any.
fn following_dialog(document: &Document, session: &Session) -> Option<usize> {
    session
        .dialog_index()
        .map(|index| index + 1)
        .filter(|next| *next < document.dialogs.len())
}

/// Hangup, exit and cancel end the session normally; anything else is an
/// unhandled event.
fn terminal_status(event: PlatformEvent) -> InterpreterResult<StatusCode> {
    let category = event.category();
    if category.ends_session_normally() {
        Ok(category.status_code())
    } else {
        Err(InterpreterError::EventNotHandled { event: event.name })
    }
}
