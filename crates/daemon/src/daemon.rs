//! Daemon composition root and main loop.
//!
//! [`Daemon`] builds every pipeline component once and hands them to each
//! other explicitly. `run_until` drives the scheduler tick and the stale
//! file sweep, and on shutdown flushes pending updates before returning.

use crate::admission::AdmissionQueue;
use crate::batcher::UpdateBatcher;
use crate::config::{Config, ConfigError};
use crate::json_store::JsonStore;
use crate::maintenance::{StaleProcessingSweeper, SweepReport};
use crate::models::{current_timestamp_ms, FileId};
use crate::paths::{LayoutError, PathLayout};
use crate::publisher::Publisher;
use crate::reconcile::{
    ReconcileError, ReconcileOptions, ReconcileReport, ReconcileSummary, ReconciliationScanner,
};
use crate::status::{new_shared_status, SharedStatus};
use crate::status_server::run_status_server;
use crate::store::{StoreError, TaskState, VariantStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Invalid status server address {addr}: {reason}")]
    InvalidBindAddr { addr: String, reason: String },

    /// The executor side of the dispatch channel is gone.
    #[error("Dispatch channel closed")]
    DispatchClosed,
}

pub struct Daemon {
    pub config: Config,
    layout: PathLayout,
    variants: Arc<dyn VariantStore>,
    admission: AdmissionQueue,
    batcher: UpdateBatcher,
    sweeper: StaleProcessingSweeper,
    status: SharedStatus,
}

impl Daemon {
    /// Prepare the storage root and open the file-backed store from config.
    ///
    /// Must be called inside a tokio runtime; the update batcher is spawned
    /// here.
    pub async fn new(config: Config, publisher: Arc<dyn Publisher>) -> Result<Self, DaemonError> {
        let layout = PathLayout::new(&config.storage.root)?;
        let store = Arc::new(JsonStore::open(&config.storage.state_dir).await?);
        tracing::info!(
            storage_root = %layout.root().display(),
            state_dir = %store.state_dir().display(),
            "Pipeline storage ready"
        );
        Ok(Self::with_components(
            config,
            layout,
            store.clone(),
            store,
            publisher,
        ))
    }

    /// Assemble a daemon from already-built collaborators.
    pub fn with_components(
        config: Config,
        layout: PathLayout,
        tasks: Arc<dyn TaskState>,
        variants: Arc<dyn VariantStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let batcher = UpdateBatcher::spawn(
            publisher.clone(),
            Duration::from_millis(config.updates.debounce_ms),
        );
        let sweeper = StaleProcessingSweeper::new(
            tasks.clone(),
            publisher,
            batcher.clone(),
            Duration::from_secs(config.scheduler.stale_processing_minutes.saturating_mul(60)),
        );

        Self {
            config,
            layout,
            variants,
            admission: AdmissionQueue::new(tasks),
            batcher,
            sweeper,
            status: new_shared_status(),
        }
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn admission(&self) -> &AdmissionQueue {
        &self.admission
    }

    /// Handle for executors to report progress through.
    pub fn batcher(&self) -> UpdateBatcher {
        self.batcher.clone()
    }

    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// One scheduler tick: admit at most one file and hand it to the executor.
    pub async fn tick(&self, dispatch: &mpsc::Sender<FileId>) -> Result<Option<FileId>, DaemonError> {
        let admitted = self.admission.check_queue().await;
        self.refresh_status().await;

        let admitted = admitted?;
        if let Some(file_id) = &admitted {
            dispatch
                .send(file_id.clone())
                .await
                .map_err(|_| DaemonError::DispatchClosed)?;
        }
        Ok(admitted)
    }

    /// Fail files stuck in PROCESSING.
    pub async fn run_maintenance(&self) -> Result<SweepReport, DaemonError> {
        let report = self.sweeper.sweep(current_timestamp_ms()).await?;
        if !report.failed.is_empty() {
            let mut status = self.status.write().await;
            status.stale_failed += report.failed.len() as u64;
        }
        Ok(report)
    }

    /// Check variant rows against the storage root.
    pub async fn reconcile(&self, options: ReconcileOptions) -> Result<ReconcileReport, DaemonError> {
        let scanner = ReconciliationScanner::new(self.layout.clone(), self.variants.clone());
        let report = scanner.reconcile(options).await?;

        let mut status = self.status.write().await;
        status.last_reconcile = Some(ReconcileSummary::from_report(
            &report,
            current_timestamp_ms(),
        ));
        Ok(report)
    }

    /// Spawn the status server if it is enabled.
    pub fn start_status_server(&self) -> Result<Option<tokio::task::JoinHandle<()>>, DaemonError> {
        let server = &self.config.status_server;
        if !server.enabled {
            return Ok(None);
        }

        let addr: SocketAddr =
            server
                .bind_addr
                .parse()
                .map_err(|e: std::net::AddrParseError| DaemonError::InvalidBindAddr {
                    addr: server.bind_addr.clone(),
                    reason: e.to_string(),
                })?;

        let status = self.status.clone();
        Ok(Some(tokio::spawn(async move {
            if let Err(e) = run_status_server(status, addr).await {
                tracing::error!(error = %e, "Status server error");
            }
        })))
    }

    /// Run the scheduler and maintenance loops until `shutdown` resolves.
    ///
    /// Dequeued file ids are sent on `dispatch`. If the receiving side is
    /// dropped the loop stops as if shut down. Pending updates are flushed
    /// before returning.
    pub async fn run_until<F>(&self, dispatch: mpsc::Sender<FileId>, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let scheduler = &self.config.scheduler;
        let mut tick = tokio::time::interval(Duration::from_millis(scheduler.tick_interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut maintenance =
            tokio::time::interval(Duration::from_secs(scheduler.maintenance_interval_secs.max(1)));
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            tick_interval_ms = scheduler.tick_interval_ms,
            maintenance_interval_secs = scheduler.maintenance_interval_secs,
            stale_threshold_secs = self.sweeper.threshold().as_secs(),
            "Scheduler started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                _ = tick.tick() => match self.tick(&dispatch).await {
                    Ok(_) => {}
                    Err(DaemonError::DispatchClosed) => {
                        tracing::warn!("Executor dispatch channel closed, stopping scheduler");
                        break;
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduler tick failed"),
                },
                _ = maintenance.tick() => {
                    if let Err(e) = self.run_maintenance().await {
                        tracing::error!(error = %e, "Stale processing sweep failed");
                    }
                }
            }
        }

        let flushed = self.batcher.shutdown().await;
        self.refresh_status().await;
        tracing::info!(flushed, "Daemon stopped");
        Ok(())
    }

    async fn refresh_status(&self) {
        let mut status = self.status.write().await;
        status.timestamp_unix_ms = current_timestamp_ms();
        status.admission_busy = self.admission.is_busy();
        status.admission = self.admission.stats();
        status.updates = self.batcher.stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileUpdate, FileVariant, MediaFile, MediaType, ProcessingStatus};
    use crate::publisher::testing::RecordingPublisher;
    use crate::store::MemoryStore;
    use crate::variant::VariantKind;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct Harness {
        _temp: TempDir,
        store: Arc<MemoryStore>,
        publisher: Arc<RecordingPublisher>,
        daemon: Daemon,
    }

    fn harness(config: Config) -> Harness {
        let temp = TempDir::new().unwrap();
        let layout = PathLayout::new(temp.path().join("storage")).unwrap();
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let daemon = Daemon::with_components(
            config,
            layout,
            store.clone(),
            store.clone(),
            publisher.clone(),
        );
        Harness {
            _temp: temp,
            store,
            publisher,
            daemon,
        }
    }

    #[tokio::test]
    async fn test_new_prepares_storage_and_state() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = temp.path().join("storage");
        config.storage.state_dir = temp.path().join("state");

        let daemon = Daemon::new(config, Arc::new(RecordingPublisher::default()))
            .await
            .unwrap();

        assert!(daemon.layout().content_root().is_dir());
        assert!(temp.path().join("state").join("files").is_dir());
    }

    #[tokio::test]
    async fn test_tick_dispatches_and_updates_status() {
        let h = harness(Config::default());
        h.store
            .insert_file(MediaFile::new_queued("f1", MediaType::Video))
            .await;
        let (tx, mut rx) = mpsc::channel(4);

        assert_eq!(h.daemon.tick(&tx).await.unwrap(), Some(FileId::new("f1")));
        assert_eq!(rx.recv().await, Some(FileId::new("f1")));

        // f1 is now PROCESSING, so the next tick admits nothing.
        assert_eq!(h.daemon.tick(&tx).await.unwrap(), None);

        let status = h.daemon.status().read().await.clone();
        assert_eq!(status.admission.checks_run, 2);
        assert_eq!(status.admission.items_dequeued, 1);
        assert!(!status.admission_busy);
    }

    #[tokio::test]
    async fn test_tick_reports_closed_dispatch() {
        let h = harness(Config::default());
        h.store
            .insert_file(MediaFile::new_queued("f1", MediaType::Gif))
            .await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(matches!(
            h.daemon.tick(&tx).await,
            Err(DaemonError::DispatchClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_dispatches_then_flushes_on_shutdown() {
        let h = harness(Config::default());
        h.store
            .insert_file(MediaFile::new_queued("f1", MediaType::Video))
            .await;

        let batcher = h.daemon.batcher();
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let executor = async move {
            let file_id = rx.recv().await;
            batcher.add_update(FileId::new("f1"), FileUpdate::progress(50));
            let _ = stop_tx.send(());
            file_id
        };
        let shutdown = async move {
            let _ = stop_rx.await;
        };

        let (result, dispatched) = tokio::join!(h.daemon.run_until(tx, shutdown), executor);
        result.unwrap();
        assert_eq!(dispatched, Some(FileId::new("f1")));

        let messages = h.publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message["processingProgress"], 50);
        assert_eq!(h.daemon.status().read().await.updates.updates_published, 1);
    }

    #[tokio::test]
    async fn test_maintenance_counts_stale_failures() {
        let h = harness(Config::default());
        let mut stuck = MediaFile::new_queued("stuck", MediaType::Video);
        stuck.processing_status = ProcessingStatus::Processing;
        stuck.updated_at = current_timestamp_ms() - 31 * 60 * 1000;
        h.store.insert_file(stuck).await;

        let report = h.daemon.run_maintenance().await.unwrap();
        assert_eq!(report.failed, vec![FileId::new("stuck")]);
        assert_eq!(h.daemon.status().read().await.stale_failed, 1);
    }

    #[tokio::test]
    async fn test_reconcile_records_summary() {
        let h = harness(Config::default());
        h.store
            .insert_variant(FileVariant::new("gone", VariantKind::Original, "mov"))
            .await;

        let report = h.daemon.reconcile(ReconcileOptions::default()).await.unwrap();
        assert_eq!(report.issues.len(), 1);

        let summary = h.daemon.status().read().await.last_reconcile.unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.issues, 1);
        assert_eq!(summary.fixed, 0);
    }

    #[tokio::test]
    async fn test_extreme_durations_do_not_panic() {
        let mut config = Config::default();
        config.scheduler.stale_processing_minutes = u64::MAX;
        config.updates.debounce_ms = u64::MAX;
        let h = harness(config);

        assert_eq!(h.daemon.sweeper.threshold(), Duration::from_secs(u64::MAX));

        let batcher = h.daemon.batcher();
        batcher.add_update(FileId::new("f1"), FileUpdate::progress(1));
        assert_eq!(batcher.flush_immediate().await, 1);
        assert_eq!(h.publisher.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_status_server_bind_addr_validation() {
        let mut config = Config::default();
        config.status_server.bind_addr = "not an address".to_string();
        let h = harness(config);
        assert!(matches!(
            h.daemon.start_status_server(),
            Err(DaemonError::InvalidBindAddr { .. })
        ));

        let mut config = Config::default();
        config.status_server.enabled = false;
        let h = harness(config);
        assert!(h.daemon.start_status_server().unwrap().is_none());
    }
}
