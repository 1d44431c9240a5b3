pub mod channel;
pub mod handler;

pub use channel::{EventReceiver, EventSender};
pub use handler::{EventHandlerTable, EventPattern, Handler, Resolution};

use crate::error::StatusCode;
use crate::eval::expression::Value;

pub const NOINPUT: &str = "noinput";
pub const NOMATCH: &str = "nomatch";
pub const HELP: &str = "help";
pub const CANCEL: &str = "cancel";
pub const EXIT: &str = "exit";
pub const HANGUP: &str = "connection.disconnect.hangup";
pub const ERROR: &str = "error";
pub const ERROR_SEMANTIC: &str = "error.semantic";
pub const ERROR_BADFETCH: &str = "error.badfetch";
pub const ERROR_NORESOURCE: &str = "error.noresource";

/// An event thrown by the platform, the caller or executable content.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEvent {
    pub name: String,
    pub message: Option<Value>,
}

impl PlatformEvent {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            message: None,
        }
    }

    pub fn with_message<V: Into<Value>>(mut self, message: V) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn category(&self) -> EventCategory {
        EventCategory::of(&self.name)
    }
}

/// Coarse classification that decides what happens to unhandled events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum EventCategory {
    NoInput,
    NoMatch,
    Help,
    Cancel,
    Exit,
    Hangup,
    Error,
    Custom,
}

impl EventCategory {
    pub fn of(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        let first = name.split('.').next().unwrap_or_default();
        match first {
            NOINPUT => EventCategory::NoInput,
            NOMATCH => EventCategory::NoMatch,
            HELP => EventCategory::Help,
            CANCEL => EventCategory::Cancel,
            EXIT => EventCategory::Exit,
            ERROR => EventCategory::Error,
            "connection" if name.starts_with("connection.disconnect") => EventCategory::Hangup,
            _ => EventCategory::Custom,
        }
    }

    /// Unhandled occurrences reprompt instead of ending the dialog.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EventCategory::NoInput | EventCategory::NoMatch | EventCategory::Help
        )
    }

    /// Unhandled occurrences end the session normally rather than in error.
    pub fn ends_session_normally(&self) -> bool {
        matches!(
            self,
            EventCategory::Cancel | EventCategory::Exit | EventCategory::Hangup
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EventCategory::NoInput => StatusCode::NoInput,
            EventCategory::NoMatch => StatusCode::NoMatch,
            EventCategory::Help => StatusCode::HelpRequested,
            EventCategory::Cancel => StatusCode::Cancel,
            EventCategory::Exit => StatusCode::ExitRequested,
            EventCategory::Hangup => StatusCode::UserHangup,
            EventCategory::Error | EventCategory::Custom => StatusCode::EventNotHandled,
        }
    }
}
