use super::prompt::Prompt;

/// Executable content found in `<filled>`, `<block>` and catch handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Assign {
        name: String,
        expr: String,
    },
    /// Declares a variable in the scope of the running handler.
    Var {
        name: String,
        expr: Option<String>,
    },
    /// Resets the named form items; an empty list resets every item.
    Clear {
        names: Vec<String>,
    },
    Prompt(Prompt),
    Reprompt,
    Goto(GotoTarget),
    Throw {
        event: String,
        message: Option<String>,
    },
    Exit,
    Disconnect,
    Log(Prompt),
    If {
        branches: Vec<ConditionalBranch>,
        otherwise: Vec<Action>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub cond: String,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoTarget {
    /// `next="#dialog"`
    Dialog(String),
    /// `nextitem="name"`
    Item(String),
}

impl GotoTarget {
    /// Accepts `#id` and bare ids alike.
    pub fn dialog<S: AsRef<str>>(next: S) -> Self {
        GotoTarget::Dialog(next.as_ref().trim_start_matches('#').to_string())
    }
}
