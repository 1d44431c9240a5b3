//! # Event handler tables
//!
//! Every scope that may catch events (form item, dialog, document) owns one
//! [`EventHandlerTable`]. A table is an ordered list of `(pattern, handler)`
//! pairs; registering a pattern twice replaces the earlier handler in place.
//!
//! ## Resolution
//!
//! [`EventHandlerTable::resolve`] walks a scope chain nearest-first. Inside a
//! single scope the pattern that is the longest token prefix of the event
//! name wins. The first scope with any match decides, so a nearer, less
//! specific handler beats a farther, more specific one:
//!
//! ```text
//! field:    error            <- selected for error.badfetch.timeout
//! dialog:   error.badfetch
//! document: (none)
//! ```

use std::fmt;

use crate::model::action::Action;
use crate::{InterpreterError, InterpreterResult};

/// Dot-separated event-name prefix, compared case-insensitively.
///
/// The empty pattern matches every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EventPattern {
    tokens: Vec<String>,
}

impl EventPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            tokens: tokenize(pattern),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// `event` is the pattern itself or starts with the pattern followed by `.`.
    pub fn matches(&self, event: &[String]) -> bool {
        self.tokens.len() <= event.len()
            && self.tokens.iter().zip(event).all(|(p, e)| p == e)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tokens.join("."))
    }
}

fn tokenize(name: &str) -> Vec<String> {
    name.trim()
        .split('.')
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Handler {
    pub actions: Vec<Action>,
}

impl Handler {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHandlerTable {
    entries: Vec<(EventPattern, Handler)>,
}

/// A successful lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    pub handler: &'a Handler,
    pub pattern: &'a EventPattern,
    /// Position of the matching table in the scope chain, 0 = nearest.
    pub depth: usize,
}

impl EventHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `pattern`. Returns the handler it replaced.
    pub fn add_handler(&mut self, pattern: &str, handler: Handler) -> Option<Handler> {
        let pattern = EventPattern::new(pattern);
        match self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, existing)) => Some(std::mem::replace(existing, handler)),
            None => {
                self.entries.push((pattern, handler));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &EventPattern> {
        self.entries.iter().map(|(p, _)| p)
    }

    /// Longest matching pattern within this table only. Ties keep the
    /// earliest registration, which only happens for identical patterns.
    pub fn find(&self, event_name: &str) -> Option<(&EventPattern, &Handler)> {
        let event = tokenize(event_name);
        self.find_tokens(&event)
    }

    fn find_tokens(&self, event: &[String]) -> Option<(&EventPattern, &Handler)> {
        self.entries
            .iter()
            .filter(|(pattern, _)| pattern.matches(event))
            .fold(None, |best: Option<&(EventPattern, Handler)>, entry| match best {
                Some(b) if b.0.len() >= entry.0.len() => Some(b),
                _ => Some(entry),
            })
            .map(|(pattern, handler)| (pattern, handler))
    }

    /// Resolves `event_name` through `chain`, nearest scope first.
    pub fn resolve<'a>(
        chain: &[&'a EventHandlerTable],
        event_name: &str,
    ) -> InterpreterResult<Resolution<'a>> {
        let event = tokenize(event_name);
        chain
            .iter()
            .enumerate()
            .find_map(|(depth, table)| {
                table
                    .find_tokens(&event)
                    .map(|(pattern, handler)| Resolution {
                        handler,
                        pattern,
                        depth,
                    })
            })
            .ok_or_else(|| InterpreterError::EventNotHandled {
                event: event_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::prompt::Prompt;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn handler(label: &str) -> Handler {
        Handler::new(vec![Action::Prompt(Prompt::text(label))])
    }

    #[test]
    fn test_pattern_matching_is_token_based() {
        let pattern = EventPattern::new("error.bad");
        assert!(pattern.matches(&tokenize("error.bad")));
        assert!(pattern.matches(&tokenize("error.bad.fetch")));
        assert!(!pattern.matches(&tokenize("error.badfetch")));
        assert!(!pattern.matches(&tokenize("error")));
    }

    #[test]
    fn test_pattern_normalization() {
        assert_eq!(EventPattern::new("Error.BadFetch."), EventPattern::new("error.badfetch"));
        assert!(EventPattern::new("").matches(&tokenize("anything.at.all")));
        assert_eq!(EventPattern::new("").to_string(), "");
    }

    #[test]
    fn test_add_handler_replaces_duplicate() {
        let mut table = EventHandlerTable::new();
        assert!(table.add_handler("noinput", handler("first")).is_none());
        let replaced = table.add_handler("NoInput", handler("second"));

        assert_eq!(replaced, Some(handler("first")));
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("noinput").unwrap().1, &handler("second"));
    }

    #[test]
    fn test_longest_prefix_wins_within_scope() {
        let mut table = EventHandlerTable::new();
        table.add_handler("error", handler("generic"));
        table.add_handler("error.badfetch", handler("badfetch"));
        table.add_handler("", handler("catch-all"));

        let (pattern, found) = table.find("error.badfetch.http.404").unwrap();
        assert_eq!(pattern.to_string(), "error.badfetch");
        assert_eq!(found, &handler("badfetch"));
        assert_eq!(table.find("error.semantic").unwrap().1, &handler("generic"));
        assert_eq!(table.find("help").unwrap().1, &handler("catch-all"));
    }

    #[test]
    fn test_nearer_scope_beats_more_specific() {
        let mut field = EventHandlerTable::new();
        field.add_handler("error", handler("field error"));
        let mut dialog = EventHandlerTable::new();
        dialog.add_handler("error.badfetch", handler("dialog badfetch"));
        let document = EventHandlerTable::new();

        let resolution =
            EventHandlerTable::resolve(&[&field, &dialog, &document], "error.badfetch.timeout")
                .unwrap();
        assert_eq!(resolution.handler, &handler("field error"));
        assert_eq!(resolution.depth, 0);

        let resolution =
            EventHandlerTable::resolve(&[&field, &dialog, &document], "error.badfetch").unwrap();
        assert_eq!(resolution.handler, &handler("field error"));
    }

    #[test]
    fn test_resolution_falls_through_scopes() {
        let field = EventHandlerTable::new();
        let dialog = EventHandlerTable::new();
        let mut document = EventHandlerTable::new();
        document.add_handler("nomatch", handler("document nomatch"));

        let resolution =
            EventHandlerTable::resolve(&[&field, &dialog, &document], "nomatch").unwrap();
        assert_eq!(resolution.depth, 2);

        let err = EventHandlerTable::resolve(&[&field, &dialog, &document], "noinput").unwrap_err();
        assert!(matches!(err, InterpreterError::EventNotHandled { event } if event == "noinput"));
    }

    proptest! {
        #[test]
        fn prop_every_prefix_of_an_event_matches(tokens in prop::collection::vec("[a-z]{1,6}", 1..6)) {
            let event = tokens.join(".");
            for cut in 0..=tokens.len() {
                let pattern = EventPattern::new(&tokens[..cut].join("."));
                prop_assert!(pattern.matches(&tokenize(&event)));
            }
        }

        #[test]
        fn prop_longest_registered_prefix_is_selected(
            tokens in prop::collection::vec("[a-z]{1,6}", 1..6),
            registered in prop::collection::btree_set(0usize..6, 1..4),
        ) {
            let event = tokens.join(".");
            let mut table = EventHandlerTable::new();
            for cut in &registered {
                let cut = (*cut).min(tokens.len());
                table.add_handler(&tokens[..cut].join("."), handler(&cut.to_string()));
            }
            let expected = registered.iter().map(|c| (*c).min(tokens.len())).max().unwrap();
            let (pattern, _) = table.find(&event).unwrap();
            prop_assert_eq!(pattern.len(), expected);
        }
    }
}
