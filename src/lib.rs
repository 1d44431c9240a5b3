//! # vxml
//!
//! A VoiceXML form interpretation engine.
//!
//! A [`parser::DocumentParser`] turns a document into the immutable
//! [`model::Document`]. The [`Interpreter`] creates a [`session::Session`] for
//! it and drives each dialog: forms run through the form interpretation
//! algorithm in [`runtime::FormInterpreter`], menus through
//! [`runtime::MenuInterpreter`]. Recognition and playback are delegated to the
//! [`platform::Collector`] and [`platform::Player`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vxml::platform::{CollectResult, Platform, ScriptedCollector, TracingPlayer};
//! use vxml::{Interpreter, XmlDocumentParser};
//!
//! # async fn example() -> vxml::InterpreterResult<()> {
//! let collector = ScriptedCollector::new([CollectResult::Recognized("tea".into())]);
//! let platform = Platform::new(Arc::new(collector), Arc::new(TracingPlayer::new()));
//! let mut interpreter = Interpreter::new(Arc::new(XmlDocumentParser::new()), platform);
//!
//! interpreter.load_document("order.vxml").await?;
//! interpreter.initialize()?;
//! let status = interpreter.run().await?;
//! println!("finished with {}", status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod event;
pub mod interpreter;
pub mod model;
pub mod parser;
pub mod platform;
pub mod runtime;
pub mod session;

// Re-exports
pub use config::InterpreterConfig;
pub use error::*;
pub use eval::{ScopeEnvironment, ScopeLevel, ScriptContext, Value};
pub use event::{EventHandlerTable, EventSender, PlatformEvent};
pub use interpreter::{Interpreter, InterpreterState};
pub use parser::{DocumentParser, StaticDocumentParser, XmlDocumentParser};
pub use session::Session;
