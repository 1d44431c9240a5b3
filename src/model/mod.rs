//! Immutable document model produced by a [`crate::parser::DocumentParser`].
//!
//! ```text
//! Document
//! ├── variables, handlers          (document scope)
//! └── Dialog = Form | Menu
//!     ├── Form: variables, handlers, items
//!     │   └── FormItem { kind: Field | Block | Initial }
//!     └── Menu: prompts, choices, handlers
//! ```
//!
//! Nothing here changes while a call is running; per-call state lives in
//! [`crate::session::Session`].

pub mod action;
pub mod document;
pub mod form;
pub mod menu;
pub mod prompt;

pub use action::{Action, ConditionalBranch, GotoTarget};
pub use document::{Dialog, Document};
pub use form::{Form, FormItem, FormItemKind, GrammarRef, InputMode, VariableDecl};
pub use menu::{Choice, Menu};
pub use prompt::{Prompt, PromptQueue, PromptSegment};
