//! Recovery of files stuck in PROCESSING.
//!
//! An executor that dies mid-transcode leaves its file in PROCESSING
//! forever. The sweeper marks any file whose last status change is older
//! than the threshold as FAILED and tells subscribers directly. A pending
//! batched progress update for that file is dropped first so it cannot
//! land after the failure.

use crate::batcher::UpdateBatcher;
use crate::models::{FileId, FileUpdate, MediaFile, ProcessingStatus};
use crate::publisher::{Publisher, FILE_UPDATED_TOPIC};
use crate::store::{StoreError, TaskState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Default age after which a PROCESSING file counts as stale.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// True if `file` is PROCESSING and unchanged for longer than `threshold`.
pub fn is_stale(file: &MediaFile, now_ms: i64, threshold: Duration) -> bool {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    file.processing_status == ProcessingStatus::Processing
        && now_ms.saturating_sub(file.updated_at) > threshold_ms
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub failed: Vec<FileId>,
    pub errors: usize,
}

pub struct StaleProcessingSweeper {
    tasks: Arc<dyn TaskState>,
    publisher: Arc<dyn Publisher>,
    batcher: UpdateBatcher,
    threshold: Duration,
}

impl StaleProcessingSweeper {
    pub fn new(
        tasks: Arc<dyn TaskState>,
        publisher: Arc<dyn Publisher>,
        batcher: UpdateBatcher,
        threshold: Duration,
    ) -> Self {
        Self {
            tasks,
            publisher,
            batcher,
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Fail every stale file. A failure on one file is logged and the
    /// sweep moves on.
    pub async fn sweep(&self, now_ms: i64) -> Result<SweepReport, StoreError> {
        let processing = self.tasks.list_processing().await?;
        let mut report = SweepReport {
            checked: processing.len(),
            ..SweepReport::default()
        };

        for file in processing
            .iter()
            .filter(|f| is_stale(f, now_ms, self.threshold))
        {
            let minutes = self.threshold.as_secs() / 60;
            let notes = format!("Processing timed out after {} minutes", minutes);
            tracing::warn!(
                file_id = %file.id,
                updated_at = file.updated_at,
                "Detected stale processing file"
            );

            if let Err(e) = self.tasks.mark_failed(&file.id, &notes).await {
                report.errors += 1;
                tracing::error!(file_id = %file.id, error = %e, "Failed to mark stale file as failed");
                continue;
            }

            self.batcher.clear_update(&file.id);
            let update = FileUpdate {
                processing_status: Some(ProcessingStatus::Failed),
                processing_progress: None,
                processing_notes: Some(notes),
            };
            let message = json!({
                "fileId": file.id,
                "processingStatus": update.processing_status,
                "processingNotes": update.processing_notes,
            });
            if let Err(e) = self.publisher.publish(FILE_UPDATED_TOPIC, message).await {
                tracing::warn!(file_id = %file.id, error = %e, "Failed to publish stale failure");
            }

            report.failed.push(file.id.clone());
        }

        if !report.failed.is_empty() || report.errors > 0 {
            tracing::info!(
                checked = report.checked,
                failed = report.failed.len(),
                errors = report.errors,
                "Stale processing sweep finished"
            );
        }
        Ok(report)
    }
}
