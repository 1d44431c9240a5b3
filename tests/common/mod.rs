#![allow(dead_code)]

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vxml::model::Document;
use vxml::platform::{CollectResult, Platform, ScriptedCollector, TracingPlayer};
use vxml::{Interpreter, StaticDocumentParser};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub struct Harness {
    pub interpreter: Interpreter,
    pub collector: Arc<ScriptedCollector>,
    pub player: Arc<TracingPlayer>,
}

/// Interpreter over an in-memory document answering collects from `script`.
pub fn harness(document: Document, script: Vec<CollectResult>) -> Harness {
    let collector = Arc::new(ScriptedCollector::new(script));
    let player = Arc::new(TracingPlayer::new());
    let interpreter = Interpreter::new(
        Arc::new(StaticDocumentParser::new().with_document(document)),
        Platform::new(collector.clone(), player.clone()),
    );
    Harness {
        interpreter,
        collector,
        player,
    }
}

pub async fn start(harness: &mut Harness, uri: &str) {
    harness.interpreter.load_document(uri).await.unwrap();
    harness.interpreter.initialize().unwrap();
}
