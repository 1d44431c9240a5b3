use super::{
    action::{Action, GotoTarget},
    form::{GrammarRef, InputMode},
    prompt::Prompt,
};
use crate::event::handler::{EventHandlerTable, Handler};
use crate::session::Session;
use crate::InterpreterResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub text: String,
    pub dtmf: Option<String>,
    pub next: GotoTarget,
}

impl Choice {
    pub fn new<S: Into<String>>(text: S, next: &str) -> Self {
        Self {
            text: text.into(),
            dtmf: None,
            next: GotoTarget::dialog(next),
        }
    }

    pub fn with_dtmf<S: Into<String>>(mut self, dtmf: S) -> Self {
        self.dtmf = Some(dtmf.into());
        self
    }

    /// Case-insensitive match on the spoken text or exact match on the key.
    pub fn matches(&self, utterance: &str) -> bool {
        let utterance = utterance.trim();
        self.dtmf.as_deref() == Some(utterance) || self.text.eq_ignore_ascii_case(utterance)
    }

    pub fn grammars(&self) -> Vec<GrammarRef> {
        let mut grammars = vec![GrammarRef::inline(self.text.clone(), InputMode::Voice)];
        if let Some(dtmf) = &self.dtmf {
            grammars.push(GrammarRef::inline(dtmf.clone(), InputMode::Dtmf));
        }
        grammars
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Menu {
    pub id: String,
    pub prompts: Vec<Prompt>,
    pub choices: Vec<Choice>,
    pub handlers: EventHandlerTable,
}

impl Menu {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_handler(mut self, pattern: &str, actions: Vec<Action>) -> Self {
        self.handlers.add_handler(pattern, Handler::new(actions));
        self
    }

    pub fn prompt_for_attempt(&self, attempts: u32) -> Option<&Prompt> {
        let last = self.prompts.len().checked_sub(1)?;
        self.prompts.get((attempts as usize).min(last))
    }

    pub fn find_choice(&self, utterance: &str) -> Option<usize> {
        self.choices.iter().position(|c| c.matches(utterance))
    }

    /// A menu is tracked in the session as a single pseudo-item named
    /// after the menu, which carries its attempt counter.
    pub fn start(&self, session: &mut Session) -> InterpreterResult<()> {
        session.begin_dialog(std::iter::once(self.id.clone()));
        session
            .scope_mut()
            .clear_scope(crate::eval::context::ScopeLevel::Anonymous);
        Ok(())
    }

    pub fn is_complete(&self, session: &Session) -> bool {
        session.selected_choice().is_some()
    }
}
