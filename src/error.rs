use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::context::ScriptError;
use crate::interpreter::InterpreterState;

/// Outcome codes shared by every public operation.
///
/// Interaction outcomes (`NoInput`, `NoMatch`, `Cancel`, `HelpRequested`,
/// `UserHangup`, `ExitRequested`) are normal signals, not failures. They are
/// reported through [`crate::interpreter::Interpreter::last_status`] and the
/// value returned by `run`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum StatusCode {
    #[default]
    Success,

    // document loading
    DocumentNotFound,
    ParseError,
    ValidationError,

    UnsupportedFeature,

    // execution
    InternalError,
    InvalidState,
    InvalidTransition,
    MissingRequiredElement,
    EventNotHandled,

    // interaction
    UserHangup,
    NoInput,
    NoMatch,
    Cancel,
    HelpRequested,

    // application flow
    NoMoreDialogs,
    ExitRequested,
}

impl StatusCode {
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }

    /// Process exit status for a session that ended with this code.
    pub fn exit_code(&self) -> i32 {
        match self {
            StatusCode::Success
            | StatusCode::UserHangup
            | StatusCode::ExitRequested
            | StatusCode::Cancel => 0,
            StatusCode::DocumentNotFound | StatusCode::ParseError | StatusCode::ValidationError => {
                2
            }
            _ => 1,
        }
    }
}

/// Errors reported by a [`crate::parser::DocumentParser`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Document not found: {uri}")]
    NotFound { uri: String },

    #[error("Failed to parse {uri}: {message}")]
    Parse { uri: String, message: String },

    #[error("Invalid document {uri}: {message}")]
    Validation { uri: String, message: String },
}

impl DocumentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DocumentError::NotFound { .. } => StatusCode::DocumentNotFound,
            DocumentError::Parse { .. } => StatusCode::ParseError,
            DocumentError::Validation { .. } => StatusCode::ValidationError,
        }
    }
}

/// Failures of the recognition / playback platform.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Collect failed: {0}")]
    CollectFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("A collect is already pending for session {session_id}")]
    CollectPending { session_id: String },

    #[error("Event channel closed: {0}")]
    EventChannelClosed(String),
}

pub type InterpreterResult<T> = Result<T, InterpreterError>;

#[derive(Error, Debug)]
pub enum InterpreterError {
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Operation {operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: InterpreterState,
    },

    #[error("Document contains no dialogs")]
    NoMoreDialogs,

    #[error("Event not handled: {event}")]
    EventNotHandled { event: String },

    #[error("Invalid transition to {target}")]
    InvalidTransition { target: String },

    #[error("Unknown form item: {0}")]
    UnknownItem(String),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InterpreterError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        InterpreterError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            InterpreterError::Document(e) => e.status_code(),
            InterpreterError::InvalidState { .. } => StatusCode::InvalidState,
            InterpreterError::NoMoreDialogs => StatusCode::NoMoreDialogs,
            InterpreterError::EventNotHandled { .. } => StatusCode::EventNotHandled,
            InterpreterError::InvalidTransition { .. } | InterpreterError::UnknownItem(_) => {
                StatusCode::InvalidTransition
            }
            InterpreterError::Script(_)
            | InterpreterError::Platform(_)
            | InterpreterError::Config(_)
            | InterpreterError::Internal(_) => StatusCode::InternalError,
        }
    }
}
