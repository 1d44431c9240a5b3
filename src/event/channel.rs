use tokio::sync::mpsc;

use super::PlatformEvent;
use crate::error::PlatformError;
use crate::eval::expression::Value;

/// Creates the per-session channel used to deliver events from outside the
/// interpretation loop.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<PlatformEvent>,
}

impl EventSender {
    pub async fn send(&self, name: &str, message: Option<Value>) -> Result<(), PlatformError> {
        let event = PlatformEvent {
            name: name.to_string(),
            message,
        };
        self.tx
            .send(event)
            .await
            .map_err(|e| PlatformError::EventChannelClosed(e.to_string()))
    }

    /// Non-blocking variant for callers outside an async context.
    pub fn try_send(&self, name: &str, message: Option<Value>) -> Result<(), PlatformError> {
        let event = PlatformEvent {
            name: name.to_string(),
            message,
        };
        self.tx
            .try_send(event)
            .map_err(|e| PlatformError::EventChannelClosed(e.to_string()))
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<PlatformEvent>,
}

impl EventReceiver {
    /// Waits for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<PlatformEvent> {
        self.rx.recv().await
    }

    /// Drops events left over from an earlier run.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
