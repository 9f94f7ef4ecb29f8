//! Outbound notification seam.
//!
//! Topic fan-out to clients is owned by whoever implements [`Publisher`].
//! Delivery is fire-and-forget; callers log failures and move on.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Topic carrying per-file processing updates.
pub const FILE_UPDATED_TOPIC: &str = "file_updated";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: serde_json::Value) -> Result<(), PublishError>;
}

/// A message as seen by subscribers of a [`BroadcastPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    pub topic: String,
    pub message: serde_json::Value,
}

/// In-process publisher backed by a tokio broadcast channel.
///
/// Publishing with no live subscribers is not an error; the message is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Published>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, message: serde_json::Value) -> Result<(), PublishError> {
        let _ = self.sender.send(Published {
            topic: topic.to_string(),
            message,
        });
        Ok(())
    }
}
