//! Pipeline status snapshot shared between the daemon loops and the
//! status endpoint.

use crate::admission::AdmissionStats;
use crate::batcher::BatcherStats;
use crate::reconcile::ReconcileSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatus {
    pub timestamp_unix_ms: i64,
    /// An admission check is inside its critical section.
    pub admission_busy: bool,
    pub admission: AdmissionStats,
    pub updates: BatcherStats,
    /// Files failed by the stale-processing sweep since startup.
    pub stale_failed: u64,
    pub last_reconcile: Option<ReconcileSummary>,
}

pub type SharedStatus = Arc<RwLock<PipelineStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(RwLock::new(PipelineStatus::default()))
}
