//! Single-flight admission gate for the scheduler.
//!
//! Only the "is anything running / claim the next file" decision is guarded.
//! The transcode itself runs elsewhere and is not bounded here. The gate is
//! a capacity-1 semaphore whose permit is dropped on every exit path,
//! including errors and cancellation of the calling future.
//!
//! The gate is per process. Two scheduler processes sharing one task table
//! can still double-dequeue.

use crate::models::FileId;
use crate::store::{StoreError, TaskState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Result of one admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A queued file was claimed and is now PROCESSING.
    Dequeued(FileId),
    /// Nothing is queued.
    Empty,
    /// An executor is already processing a file.
    ExecutorBusy,
    /// Another check holds the gate; nothing was read.
    GateHeld,
}

impl Admission {
    pub fn into_file_id(self) -> Option<FileId> {
        match self {
            Admission::Dequeued(id) => Some(id),
            _ => None,
        }
    }
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStats {
    pub checks_run: u64,
    pub checks_skipped: u64,
    pub items_dequeued: u64,
}

#[derive(Debug, Default)]
struct Counters {
    checks_run: AtomicU64,
    checks_skipped: AtomicU64,
    items_dequeued: AtomicU64,
}

pub struct AdmissionQueue {
    gate: Semaphore,
    tasks: Arc<dyn TaskState>,
    counters: Counters,
}

impl AdmissionQueue {
    pub fn new(tasks: Arc<dyn TaskState>) -> Self {
        Self {
            gate: Semaphore::new(1),
            tasks,
            counters: Counters::default(),
        }
    }

    /// Claim the next file if the executor is idle.
    ///
    /// Returns `Ok(None)` without blocking when another check is in flight.
    /// Collaborator errors are returned after the gate is released.
    pub async fn check_queue(&self) -> Result<Option<FileId>, StoreError> {
        Ok(self.try_admit().await?.into_file_id())
    }

    /// Like [`AdmissionQueue::check_queue`] but reports why nothing was
    /// dequeued.
    pub async fn try_admit(&self) -> Result<Admission, StoreError> {
        let Ok(_permit) = self.gate.try_acquire() else {
            self.counters.checks_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Admission check already in flight, skipping");
            return Ok(Admission::GateHeld);
        };
        self.counters.checks_run.fetch_add(1, Ordering::Relaxed);

        if self.tasks.is_busy().await? {
            return Ok(Admission::ExecutorBusy);
        }

        match self.tasks.pop_next().await? {
            Some(file_id) => {
                self.counters.items_dequeued.fetch_add(1, Ordering::Relaxed);
                tracing::info!(file_id = %file_id, "Dequeued file for processing");
                Ok(Admission::Dequeued(file_id))
            }
            None => Ok(Admission::Empty),
        }
    }

    /// True while a check is inside the critical section. Diagnostic only;
    /// says nothing about executor activity.
    pub fn is_busy(&self) -> bool {
        self.gate.available_permits() == 0
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            checks_run: self.counters.checks_run.load(Ordering::Relaxed),
            checks_skipped: self.counters.checks_skipped.load(Ordering::Relaxed),
            items_dequeued: self.counters.items_dequeued.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("busy", &self.is_busy())
            .field("stats", &self.stats())
            .finish()
    }
}
