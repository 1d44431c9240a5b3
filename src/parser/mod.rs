//! Turning document URIs into [`Document`]s.

pub mod xml;

pub use xml::XmlDocumentParser;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DocumentError;
use crate::model::document::Document;

/// Fetches and parses an application document.
#[mockall::automock]
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, uri: &str) -> Result<Arc<Document>, DocumentError>;
}

/// Serves documents built in code, keyed by URI.
#[derive(Debug, Default, Clone)]
pub struct StaticDocumentParser {
    documents: HashMap<String, Arc<Document>>,
}

impl StaticDocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `document` under its own URI.
    pub fn with_document(mut self, document: Document) -> Self {
        self.insert(document);
        self
    }

    pub fn insert(&mut self, document: Document) {
        self.documents
            .insert(document.uri.clone(), Arc::new(document));
    }
}

#[async_trait]
impl DocumentParser for StaticDocumentParser {
    async fn parse(&self, uri: &str) -> Result<Arc<Document>, DocumentError> {
        self.documents
            .get(uri.trim())
            .cloned()
            .ok_or_else(|| DocumentError::NotFound {
                uri: uri.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::form::{Form, FormItem};

    #[tokio::test]
    async fn test_static_parser_serves_registered_documents() {
        let parser = StaticDocumentParser::new().with_document(
            Document::new("app.vxml").with_dialog(Form::new("main").with_item(FormItem::field("a"))),
        );

        let document = parser.parse("app.vxml").await.unwrap();
        assert_eq!(document.dialogs.len(), 1);
        assert_eq!(
            parser.parse("other.vxml").await.unwrap_err(),
            DocumentError::NotFound {
                uri: "other.vxml".to_string()
            }
        );
    }
}
