//! Reconciliation between variant rows and files on disk.
//!
//! Every persisted variant row should have a file at its layout path. The
//! scanner finds rows whose file is missing and, when asked to fix, deletes
//! the row. It never creates or deletes anything on disk, and it does not
//! look for files that have no row; orphaned bytes are left for manual
//! review.

use crate::models::{FileId, FileVariant};
use crate::paths::{LayoutError, PathLayout};
use crate::store::{StoreError, VariantStore};
use crate::variant::VariantKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure that stops a scan before any row is checked.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage layout unavailable: {0}")]
    Layout(#[from] LayoutError),

    #[error("failed to list variant rows: {0}")]
    Store(#[from] StoreError),
}

/// Defaults to a dry run that only reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub fix: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            fix: false,
        }
    }
}

impl ReconcileOptions {
    /// Options that delete dangling rows.
    pub fn fix() -> Self {
        Self {
            dry_run: false,
            fix: true,
        }
    }

    /// Rows are only deleted with `fix` set and `dry_run` cleared.
    pub fn deletes_rows(&self) -> bool {
        self.fix && !self.dry_run
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    WouldDelete,
    Deleted,
}

impl std::fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileAction::WouldDelete => write!(f, "would delete"),
            ReconcileAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// A variant row whose file is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileIssue {
    pub file_id: FileId,
    pub variant: VariantKind,
    pub extension: String,
    pub path: PathBuf,
    pub issue: String,
    pub action: ReconcileAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    /// Checking whether the file exists.
    Check,
    /// Deleting the dangling row.
    Delete,
}

/// Failure confined to one variant row.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{file_id}/{variant} ({stage:?}) at {}: {message}", .path.display())]
pub struct RowError {
    pub file_id: FileId,
    pub variant: VariantKind,
    pub path: PathBuf,
    pub stage: RowStage,
    pub message: String,
}

/// What happened to a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Present,
    Missing(ReconcileIssue),
    Failed(RowError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub issues: Vec<ReconcileIssue>,
    pub fixed: usize,
    pub errors: Vec<RowError>,
}

impl ReconcileReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record(&mut self, outcome: RowOutcome) {
        self.scanned += 1;
        match outcome {
            RowOutcome::Present => {}
            RowOutcome::Missing(issue) => {
                if issue.action == ReconcileAction::Deleted {
                    self.fixed += 1;
                }
                self.issues.push(issue);
            }
            RowOutcome::Failed(error) => self.errors.push(error),
        }
    }
}

/// Compact form kept on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub issues: usize,
    pub fixed: usize,
    pub errors: usize,
    pub finished_at_unix_ms: i64,
}

impl ReconcileSummary {
    pub fn from_report(report: &ReconcileReport, finished_at_unix_ms: i64) -> Self {
        Self {
            scanned: report.scanned,
            issues: report.issues.len(),
            fixed: report.fixed,
            errors: report.errors.len(),
            finished_at_unix_ms,
        }
    }
}

pub struct ReconciliationScanner {
    layout: PathLayout,
    variants: Arc<dyn VariantStore>,
}

impl ReconciliationScanner {
    pub fn new(layout: PathLayout, variants: Arc<dyn VariantStore>) -> Self {
        Self { layout, variants }
    }

    /// Check every variant row against the disk.
    ///
    /// The storage root must already exist; it is never created here. A
    /// missing root or a failure to list the rows is returned as an error.
    /// Per-row failures are collected in the report and the scan continues.
    pub async fn reconcile(&self, options: ReconcileOptions) -> Result<ReconcileReport, ReconcileError> {
        self.layout.verify()?;
        let rows = self.variants.list_variants().await?;
        tracing::info!(
            rows = rows.len(),
            fix = options.deletes_rows(),
            "Starting variant reconciliation"
        );

        let mut report = ReconcileReport::default();
        for row in &rows {
            let outcome = self.check_row(row, options).await;
            report.record(outcome);
        }

        tracing::info!(
            scanned = report.scanned,
            issues = report.issues.len(),
            fixed = report.fixed,
            errors = report.errors.len(),
            "Variant reconciliation finished"
        );
        Ok(report)
    }

    async fn check_row(&self, row: &FileVariant, options: ReconcileOptions) -> RowOutcome {
        let path = self
            .layout
            .variant_path(&row.file_id, row.variant, &row.extension);
        let row_error = |stage, message: String| RowError {
            file_id: row.file_id.clone(),
            variant: row.variant,
            path: path.clone(),
            stage,
            message,
        };

        match tokio::fs::try_exists(&path).await {
            Ok(true) => return RowOutcome::Present,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(file_id = %row.file_id, variant = %row.variant, error = %e, "Failed to check variant file");
                return RowOutcome::Failed(row_error(RowStage::Check, e.to_string()));
            }
        }

        let action = if options.deletes_rows() {
            match self.variants.delete_variant(&row.file_id, row.variant).await {
                Ok(removed) => {
                    if !removed {
                        tracing::debug!(file_id = %row.file_id, variant = %row.variant, "Row already removed");
                    }
                    ReconcileAction::Deleted
                }
                Err(e) => {
                    tracing::warn!(file_id = %row.file_id, variant = %row.variant, error = %e, "Failed to delete dangling row");
                    return RowOutcome::Failed(row_error(RowStage::Delete, e.to_string()));
                }
            }
        } else {
            ReconcileAction::WouldDelete
        };

        RowOutcome::Missing(ReconcileIssue {
            file_id: row.file_id.clone(),
            variant: row.variant,
            extension: row.extension.clone(),
            path,
            issue: "file missing on disk".to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        layout: PathLayout,
        store: Arc<MemoryStore>,
    }

    /// One row with its file on disk and one dangling row.
    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = PathLayout::new(temp.path().join("storage")).unwrap();
        let store = Arc::new(MemoryStore::new());

        let present = FileVariant::new("f1", VariantKind::Compressed, "mp4");
        let path = layout.variant_path(&present.file_id, present.variant, &present.extension);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"bytes").unwrap();
        store.insert_variant(present).await;

        store
            .insert_variant(FileVariant::new("f1", VariantKind::ThumbnailPoster, "jpg"))
            .await;

        Fixture {
            _temp: temp,
            layout,
            store,
        }
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_mutation() {
        let fx = fixture().await;
        let scanner = ReconciliationScanner::new(fx.layout.clone(), fx.store.clone());

        let report = scanner.reconcile(ReconcileOptions::default()).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.fixed, 0);
        assert!(!report.has_errors());
        let issue = &report.issues[0];
        assert_eq!(issue.variant, VariantKind::ThumbnailPoster);
        assert_eq!(issue.action, ReconcileAction::WouldDelete);
        assert_eq!(issue.action.to_string(), "would delete");
        assert_eq!(fx.store.variants().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fix_without_dry_run_deletes_row() {
        let fx = fixture().await;
        let scanner = ReconciliationScanner::new(fx.layout.clone(), fx.store.clone());

        let report = scanner.reconcile(ReconcileOptions::fix()).await.unwrap();

        assert_eq!(report.fixed, 1);
        assert_eq!(report.issues[0].action, ReconcileAction::Deleted);
        let remaining = fx.store.variants().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].variant, VariantKind::Compressed);

        // Bytes on disk are untouched.
        let kept = fx
            .layout
            .variant_path(&FileId::new("f1"), VariantKind::Compressed, "mp4");
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_fix_with_dry_run_still_reports_only() {
        let fx = fixture().await;
        let scanner = ReconciliationScanner::new(fx.layout.clone(), fx.store.clone());

        let report = scanner
            .reconcile(ReconcileOptions {
                dry_run: true,
                fix: true,
            })
            .await
            .unwrap();

        assert_eq!(report.fixed, 0);
        assert_eq!(fx.store.variants().await.len(), 2);
    }

    #[tokio::test]
    async fn test_row_check_error_does_not_abort_scan() {
        let fx = fixture().await;
        // A regular file where a content directory should be makes the
        // existence check fail with ENOTDIR rather than report "missing".
        fs::write(fx.layout.content_dir(&FileId::new("blocked")), b"").unwrap();
        fx.store
            .insert_variant(FileVariant::new("blocked", VariantKind::Original, "mov"))
            .await;

        let scanner = ReconciliationScanner::new(fx.layout.clone(), fx.store.clone());
        let report = scanner.reconcile(ReconcileOptions::fix()).await.unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file_id, FileId::new("blocked"));
        assert_eq!(report.errors[0].stage, RowStage::Check);
        assert_eq!(report.fixed, 1);
        assert!(report.has_errors());
    }

    #[tokio::test]
    async fn test_absent_storage_root_fails_without_deleting() {
        let fx = fixture().await;
        let wrong_root = fx.layout.root().with_file_name("storgae");
        let scanner =
            ReconciliationScanner::new(PathLayout::from_root(&wrong_root), fx.store.clone());

        let result = scanner.reconcile(ReconcileOptions::fix()).await;

        assert!(matches!(
            result,
            Err(ReconcileError::Layout(LayoutError::Missing(_)))
        ));
        assert_eq!(fx.store.variants().await.len(), 2);
        assert!(!wrong_root.exists());
    }

    struct FailingDeletes(MemoryStore);

    #[async_trait]
    impl VariantStore for FailingDeletes {
        async fn list_variants(&self) -> Result<Vec<FileVariant>, StoreError> {
            self.0.list_variants().await
        }

        async fn delete_variant(&self, _file_id: &FileId, _kind: VariantKind) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("read-only replica".to_string()))
        }
    }

    #[tokio::test]
    async fn test_delete_failure_is_collected() {
        let temp = TempDir::new().unwrap();
        let layout = PathLayout::new(temp.path()).unwrap();
        let inner = MemoryStore::new();
        inner
            .insert_variant(FileVariant::new("a", VariantKind::Thumbnail, "jpg"))
            .await;
        inner
            .insert_variant(FileVariant::new("b", VariantKind::Thumbnail, "jpg"))
            .await;

        let scanner = ReconciliationScanner::new(layout, Arc::new(FailingDeletes(inner)));
        let report = scanner.reconcile(ReconcileOptions::fix()).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.stage == RowStage::Delete));
        assert_eq!(report.fixed, 0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_report_serializes_for_json_output() {
        let report = ReconcileReport {
            scanned: 1,
            issues: vec![ReconcileIssue {
                file_id: FileId::new("f1"),
                variant: VariantKind::CompressedGif,
                extension: "gif".to_string(),
                path: PathBuf::from("/s/content/f1/COMPRESSED_GIF.gif"),
                issue: "file missing on disk".to_string(),
                action: ReconcileAction::WouldDelete,
            }],
            fixed: 0,
            errors: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["issues"][0]["variant"], "COMPRESSED_GIF");
        assert_eq!(json["issues"][0]["action"], "would_delete");
        assert_eq!(json["issues"][0]["file_id"], "f1");
    }
}
