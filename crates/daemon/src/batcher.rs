//! Debounced per-file update publishing.
//!
//! [`UpdateBatcher`] is a cheap handle onto a background task that owns the
//! pending map and the single flush timer. Each `add_update` replaces the
//! pending payload for that file and re-arms the timer; when the window
//! passes without another add, every pending payload is published as its
//! own message on [`FILE_UPDATED_TOPIC`].

use crate::models::{FileId, FileUpdate};
use crate::publisher::{Publisher, FILE_UPDATED_TOPIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Default debounce window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Command {
    Add(FileId, FileUpdate),
    Clear(FileId),
    Flush(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<usize>),
}

/// Wire shape of one published update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileUpdatedMessage<'a> {
    file_id: &'a FileId,
    #[serde(flatten)]
    update: &'a FileUpdate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    pub updates_queued: u64,
    pub updates_published: u64,
    pub updates_cleared: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    published: AtomicU64,
    cleared: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct UpdateBatcher {
    tx: mpsc::UnboundedSender<Command>,
    counters: Arc<Counters>,
}

impl UpdateBatcher {
    /// Start the batching task on the current runtime.
    pub fn spawn(publisher: Arc<dyn Publisher>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let actor = BatchActor {
            publisher,
            window,
            pending: BTreeMap::new(),
            deadline: None,
            counters: counters.clone(),
        };
        tokio::spawn(actor.run(rx));
        Self { tx, counters }
    }

    /// Queue the latest update for a file, replacing any pending one.
    pub fn add_update(&self, file_id: FileId, update: FileUpdate) {
        self.send(Command::Add(file_id, update));
    }

    /// Drop the pending update for a file without publishing it.
    pub fn clear_update(&self, file_id: &FileId) {
        self.send(Command::Clear(file_id.clone()));
    }

    /// Publish everything pending now. Returns how many updates were sent.
    pub async fn flush_immediate(&self) -> usize {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack));
        done.await.unwrap_or(0)
    }

    /// Flush and stop the batching task. Later adds are dropped.
    pub async fn shutdown(&self) -> usize {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown(ack));
        done.await.unwrap_or(0)
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            updates_queued: self.counters.queued.load(Ordering::Relaxed),
            updates_published: self.counters.published.load(Ordering::Relaxed),
            updates_cleared: self.counters.cleared.load(Ordering::Relaxed),
            publish_failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::warn!("Update batcher is stopped, dropping command");
        }
    }
}

struct BatchActor {
    publisher: Arc<dyn Publisher>,
    window: Duration,
    pending: BTreeMap<FileId, FileUpdate>,
    deadline: Option<Instant>,
    counters: Arc<Counters>,
}

impl BatchActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Add(file_id, update)) => {
                        self.counters.queued.fetch_add(1, Ordering::Relaxed);
                        self.pending.insert(file_id, update);
                        self.deadline = Some(deadline_after(self.window));
                    }
                    Some(Command::Clear(file_id)) => {
                        if self.pending.remove(&file_id).is_some() {
                            self.counters.cleared.fetch_add(1, Ordering::Relaxed);
                        }
                        if self.pending.is_empty() {
                            self.deadline = None;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        let sent = self.flush().await;
                        let _ = ack.send(sent);
                    }
                    Some(Command::Shutdown(ack)) => {
                        let sent = self.flush().await;
                        let _ = ack.send(sent);
                        break;
                    }
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    self.flush().await;
                }
            }
        }
        tracing::debug!("Update batcher stopped");
    }

    async fn flush(&mut self) -> usize {
        self.deadline = None;
        let pending = std::mem::take(&mut self.pending);
        let mut sent = 0;

        for (file_id, update) in &pending {
            let message = match serde_json::to_value(FileUpdatedMessage {
                file_id,
                update,
            }) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(file_id = %file_id, %error, "Failed to encode update");
                    continue;
                }
            };

            match self.publisher.publish(FILE_UPDATED_TOPIC, message).await {
                Ok(()) => {
                    sent += 1;
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(file_id = %file_id, %error, "Failed to publish update");
                }
            }
        }

        if !pending.is_empty() {
            tracing::debug!(pending = pending.len(), sent, "Flushed file updates");
        }
        sent
    }
}

/// Deadlines past what `Instant` can represent are capped a year out.
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessingStatus;
    use crate::publisher::testing::RecordingPublisher;

    fn setup() -> (Arc<RecordingPublisher>, UpdateBatcher) {
        let publisher = Arc::new(RecordingPublisher::default());
        let batcher = UpdateBatcher::spawn(publisher.clone(), DEFAULT_WINDOW);
        (publisher, batcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_publishes_latest_only() {
        let (publisher, batcher) = setup();
        let f1 = FileId::new("f1");

        batcher.add_update(f1.clone(), FileUpdate::progress(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        batcher.add_update(f1.clone(), FileUpdate::progress(40));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, FILE_UPDATED_TOPIC);
        assert_eq!(messages[0].message["fileId"], "f1");
        assert_eq!(messages[0].message["processingProgress"], 40);
        assert_eq!(messages[0].message["processingStatus"], "PROCESSING");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_rearms_the_window() {
        let (publisher, batcher) = setup();
        let f1 = FileId::new("f1");

        batcher.add_update(f1.clone(), FileUpdate::progress(10));
        tokio::time::sleep(Duration::from_millis(80)).await;
        batcher.add_update(f1.clone(), FileUpdate::progress(20));

        // A timer armed by the first add would have fired at 100ms.
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(publisher.messages().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message["processingProgress"], 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_window_keeps_batcher_alive() {
        let publisher = Arc::new(RecordingPublisher::default());
        let batcher = UpdateBatcher::spawn(publisher.clone(), Duration::MAX);

        batcher.add_update(FileId::new("f1"), FileUpdate::progress(5));
        batcher.add_update(FileId::new("f2"), FileUpdate::progress(6));

        assert_eq!(batcher.flush_immediate().await, 2);
        assert_eq!(publisher.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_file_published_individually() {
        let (publisher, batcher) = setup();
        batcher.add_update(FileId::new("a"), FileUpdate::progress(1));
        batcher.add_update(FileId::new("b"), FileUpdate::status(ProcessingStatus::Done));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let ids: Vec<_> = publisher
            .messages()
            .iter()
            .map(|m| m.message["fileId"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(batcher.stats().updates_published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_update_suppresses_stale_payload() {
        let (publisher, batcher) = setup();
        let f1 = FileId::new("f1");

        batcher.add_update(f1.clone(), FileUpdate::progress(90));
        batcher.clear_update(&f1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(publisher.messages().is_empty());
        let stats = batcher.stats();
        assert_eq!(stats.updates_queued, 1);
        assert_eq!(stats.updates_cleared, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_immediate_cancels_timer() {
        let (publisher, batcher) = setup();
        batcher.add_update(FileId::new("f1"), FileUpdate::progress(5));

        assert_eq!(batcher.flush_immediate().await, 1);
        assert_eq!(publisher.messages().len(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(publisher.messages().len(), 1);
        assert_eq!(batcher.flush_immediate().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_does_not_stop_flush() {
        let (publisher, batcher) = setup();
        publisher.set_failing(true);
        batcher.add_update(FileId::new("a"), FileUpdate::progress(1));
        batcher.add_update(FileId::new("b"), FileUpdate::progress(2));

        assert_eq!(batcher.flush_immediate().await, 0);
        assert_eq!(batcher.stats().publish_failures, 2);

        publisher.set_failing(false);
        batcher.add_update(FileId::new("a"), FileUpdate::progress(3));
        assert_eq!(batcher.flush_immediate().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_and_stops() {
        let (publisher, batcher) = setup();
        batcher.add_update(FileId::new("f1"), FileUpdate::progress(70));

        assert_eq!(batcher.shutdown().await, 1);
        assert_eq!(publisher.messages().len(), 1);

        batcher.add_update(FileId::new("f2"), FileUpdate::progress(1));
        assert_eq!(batcher.flush_immediate().await, 0);
        assert_eq!(publisher.messages().len(), 1);
    }
}
