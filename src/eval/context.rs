use std::collections::HashMap;

use thiserror::Error;

use super::expression::{Expression, Value};

/// Variable scopes visible to executable content, innermost first:
/// `Anonymous` (a running handler or filled block), `Dialog`, `Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ScopeLevel {
    Anonymous,
    Dialog,
    Document,
}

impl ScopeLevel {
    /// Chain seen by guard conditions and dialog-level code.
    pub const DIALOG_CHAIN: [ScopeLevel; 2] = [ScopeLevel::Dialog, ScopeLevel::Document];
    /// Chain seen by handlers and filled actions.
    pub const HANDLER_CHAIN: [ScopeLevel; 3] = [
        ScopeLevel::Anonymous,
        ScopeLevel::Dialog,
        ScopeLevel::Document,
    ];
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Syntax error in `{expression}`: {message}")]
    Syntax { expression: String, message: String },
}

/// The scripting capability consumed by the interpreter.
///
/// Lookup walks `chain` nearest-first. Assignment writes to the nearest scope
/// in `chain` that already declares the name; it never creates variables.
#[mockall::automock]
pub trait ScopeEnvironment: Send + Sync {
    fn get(&self, chain: &[ScopeLevel], name: &str) -> Value;

    fn is_declared(&self, chain: &[ScopeLevel], name: &str) -> bool;

    /// Returns the scope the value was written to.
    fn set(
        &mut self,
        chain: &[ScopeLevel],
        name: &str,
        value: Value,
    ) -> Result<ScopeLevel, ScriptError>;

    fn declare(&mut self, scope: ScopeLevel, name: &str, value: Value);

    /// Drops every variable of `scope`.
    fn clear_scope(&mut self, scope: ScopeLevel);

    fn evaluate_expression(&self, expr: &str, chain: &[ScopeLevel]) -> Result<Value, ScriptError>;

    fn evaluate_condition(&self, expr: &str, chain: &[ScopeLevel]) -> Result<bool, ScriptError> {
        Ok(self.evaluate_expression(expr, chain)?.is_truthy())
    }
}

/// Default in-process [`ScopeEnvironment`].
#[derive(Debug, Default, Clone)]
pub struct ScriptContext {
    scopes: HashMap<ScopeLevel, HashMap<String, Value>>,
}

impl ScriptContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, level: ScopeLevel) -> Option<&HashMap<String, Value>> {
        self.scopes.get(&level)
    }
}

impl ScopeEnvironment for ScriptContext {
    fn get(&self, chain: &[ScopeLevel], name: &str) -> Value {
        chain
            .iter()
            .find_map(|level| self.scope(*level).and_then(|vars| vars.get(name)))
            .cloned()
            .unwrap_or_default()
    }

    fn is_declared(&self, chain: &[ScopeLevel], name: &str) -> bool {
        chain.iter().any(|level| {
            self.scope(*level)
                .map(|vars| vars.contains_key(name))
                .unwrap_or(false)
        })
    }

    fn set(
        &mut self,
        chain: &[ScopeLevel],
        name: &str,
        value: Value,
    ) -> Result<ScopeLevel, ScriptError> {
        for level in chain {
            if let Some(slot) = self
                .scopes
                .get_mut(level)
                .and_then(|vars| vars.get_mut(name))
            {
                *slot = value;
                return Ok(*level);
            }
        }
        Err(ScriptError::UndefinedVariable(name.to_string()))
    }

    fn declare(&mut self, scope: ScopeLevel, name: &str, value: Value) {
        self.scopes
            .entry(scope)
            .or_default()
            .insert(name.to_string(), value);
    }

    fn clear_scope(&mut self, scope: ScopeLevel) {
        self.scopes.remove(&scope);
    }

    fn evaluate_expression(&self, expr: &str, chain: &[ScopeLevel]) -> Result<Value, ScriptError> {
        let parsed = Expression::parse(expr)?;
        Ok(parsed.evaluate(&|name| self.get(chain, name)))
    }
}
