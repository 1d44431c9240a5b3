//! Recognition and playback seams.
//!
//! The interpreter never recognizes speech or renders audio itself. It hands
//! a [`CollectRequest`] to a [`Collector`] and queued prompts to a [`Player`].
//! [`ScriptedCollector`] and [`TracingPlayer`] are in-process adapters used by
//! the CLI and the tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PlatformError;
use crate::eval::expression::Value;
use crate::model::form::GrammarRef;
use crate::model::prompt::PromptQueue;

/// Everything the recognizer needs for one collect.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectRequest {
    pub session_id: String,
    pub item: String,
    pub prompts: PromptQueue,
    pub grammars: Vec<GrammarRef>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectResult {
    Recognized(Value),
    NoInput,
    NoMatch,
    Hangup,
    /// Any other platform event, e.g. `help` or `cancel` spoken as a command.
    Event {
        name: String,
        message: Option<Value>,
    },
}

#[mockall::automock]
#[async_trait]
pub trait Collector: Send + Sync {
    /// Plays `request.prompts` and waits for input.
    async fn begin_collect(&self, request: CollectRequest) -> Result<CollectResult, PlatformError>;
}

#[mockall::automock]
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, prompts: &PromptQueue) -> Result<(), PlatformError>;
}

/// The pair of adapters a session talks to.
#[derive(Clone)]
pub struct Platform {
    pub collector: Arc<dyn Collector>,
    pub player: Arc<dyn Player>,
}

impl Platform {
    pub fn new(collector: Arc<dyn Collector>, player: Arc<dyn Player>) -> Self {
        Self { collector, player }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

/// Answers collects from a fixed script. Once the script runs out every
/// collect reports a hangup, so a session can never spin forever.
#[derive(Debug, Default)]
pub struct ScriptedCollector {
    results: Mutex<VecDeque<CollectResult>>,
    requests: Mutex<Vec<CollectRequest>>,
}

impl ScriptedCollector {
    pub fn new<I: IntoIterator<Item = CollectResult>>(results: I) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, result: CollectResult) {
        self.results.lock().await.push_back(result);
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<CollectRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.results.lock().await.len()
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn begin_collect(&self, request: CollectRequest) -> Result<CollectResult, PlatformError> {
        debug!(item = %request.item, prompts = request.prompts.len(), "collect");
        self.requests.lock().await.push(request);
        let result = self
            .results
            .lock()
            .await
            .pop_front()
            .unwrap_or(CollectResult::Hangup);
        Ok(result)
    }
}

/// Logs prompts instead of speaking them and keeps a transcript.
#[derive(Debug, Default)]
pub struct TracingPlayer {
    played: Mutex<Vec<String>>,
}

impl TracingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn played(&self) -> Vec<String> {
        self.played.lock().await.clone()
    }
}

#[async_trait]
impl Player for TracingPlayer {
    async fn play(&self, prompts: &PromptQueue) -> Result<(), PlatformError> {
        let mut played = self.played.lock().await;
        for prompt in prompts.iter() {
            info!(target: "vxml::prompt", "{}", prompt);
            played.push(prompt.clone());
        }
        Ok(())
    }
}
