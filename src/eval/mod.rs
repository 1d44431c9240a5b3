pub mod context;
pub mod expression;
pub mod statement;

pub use context::{MockScopeEnvironment, ScopeEnvironment, ScopeLevel, ScriptContext, ScriptError};
pub use expression::{Expression, Value};
pub use statement::{ActionExecutor, ControlFlow};
