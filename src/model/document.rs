use super::{
    action::Action,
    form::{Form, VariableDecl},
    menu::Menu,
};
use crate::eval::context::ScopeLevel;
use crate::event::handler::{EventHandlerTable, Handler};
use crate::session::Session;
use crate::InterpreterResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Dialog {
    Form(Form),
    Menu(Menu),
}

impl Dialog {
    pub fn id(&self) -> &str {
        match self {
            Dialog::Form(form) => &form.id,
            Dialog::Menu(menu) => &menu.id,
        }
    }

    pub fn handlers(&self) -> &EventHandlerTable {
        match self {
            Dialog::Form(form) => &form.handlers,
            Dialog::Menu(menu) => &menu.handlers,
        }
    }

    pub fn as_form(&self) -> Option<&Form> {
        match self {
            Dialog::Form(form) => Some(form),
            Dialog::Menu(_) => None,
        }
    }

    pub fn start(&self, session: &mut Session) -> InterpreterResult<()> {
        match self {
            Dialog::Form(form) => form.start(session),
            Dialog::Menu(menu) => menu.start(session),
        }
    }

    pub fn is_complete(&self, session: &Session) -> bool {
        match self {
            Dialog::Form(form) => form.is_complete(session),
            Dialog::Menu(menu) => menu.is_complete(session),
        }
    }
}

impl From<Form> for Dialog {
    fn from(form: Form) -> Self {
        Dialog::Form(form)
    }
}

impl From<Menu> for Dialog {
    fn from(menu: Menu) -> Self {
        Dialog::Menu(menu)
    }
}

/// A parsed application document. Read-only once built; sessions share it
/// behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub uri: String,
    pub dialogs: Vec<Dialog>,
    pub variables: Vec<VariableDecl>,
    pub handlers: EventHandlerTable,
}

impl Document {
    pub fn new<S: Into<String>>(uri: S) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_dialog<D: Into<Dialog>>(mut self, dialog: D) -> Self {
        self.dialogs.push(dialog.into());
        self
    }

    pub fn with_variable(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    pub fn with_handler(mut self, pattern: &str, actions: Vec<Action>) -> Self {
        self.handlers.add_handler(pattern, Handler::new(actions));
        self
    }

    pub fn dialog(&self, index: usize) -> Option<&Dialog> {
        self.dialogs.get(index)
    }

    pub fn dialog_index(&self, id: &str) -> Option<usize> {
        self.dialogs.iter().position(|d| d.id() == id)
    }

    /// Declares the document-scope variables for a fresh session.
    pub fn declare_variables(&self, session: &mut Session) -> InterpreterResult<()> {
        let env = session.scope_mut();
        env.clear_scope(ScopeLevel::Document);
        for decl in &self.variables {
            decl.declare_in(env, ScopeLevel::Document, &[ScopeLevel::Document])?;
        }
        Ok(())
    }
}
