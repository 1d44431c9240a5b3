use crate::eval::context::{ScopeEnvironment, ScopeLevel, ScriptError};

#[derive(Debug, Clone, PartialEq)]
pub enum PromptSegment {
    Text(String),
    /// `<value expr="..."/>`, rendered through the scope environment.
    Value(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    pub segments: Vec<PromptSegment>,
}

impl Prompt {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            segments: vec![PromptSegment::Text(text.into())],
        }
    }

    pub fn with_value<S: Into<String>>(mut self, expr: S) -> Self {
        self.segments.push(PromptSegment::Value(expr.into()));
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.segments.push(PromptSegment::Text(text.into()));
        self
    }

    pub fn render(
        &self,
        env: &dyn ScopeEnvironment,
        chain: &[ScopeLevel],
    ) -> Result<String, ScriptError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                PromptSegment::Text(text) => rendered.push_str(text),
                PromptSegment::Value(expr) => {
                    rendered.push_str(&env.evaluate_expression(expr, chain)?.to_string())
                }
            }
        }
        Ok(rendered.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Rendered prompts waiting to be played, in playback order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptQueue {
    prompts: Vec<String>,
}

impl PromptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&mut self, prompt: S) {
        let prompt = prompt.into();
        if !prompt.is_empty() {
            self.prompts.push(prompt);
        }
    }

    pub fn append(&mut self, other: &mut PromptQueue) {
        self.prompts.append(&mut other.prompts);
    }

    pub fn take(&mut self) -> PromptQueue {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.prompts.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.prompts
    }
}

impl<S: Into<String>> FromIterator<S> for PromptQueue {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut queue = PromptQueue::new();
        for prompt in iter {
            queue.push(prompt);
        }
        queue
    }
}
