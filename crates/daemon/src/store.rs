//! Persistence seams used by the pipeline.
//!
//! The record store itself belongs to the persistence layer. The pipeline
//! talks to it through [`TaskState`] (scheduling decisions and status
//! writes) and [`VariantStore`] (variant rows). [`MemoryStore`] backs both
//! in-process; see [`crate::json_store::JsonStore`] for the file-backed one.

use crate::models::{current_timestamp_ms, FileId, FileVariant, MediaFile, ProcessingStatus};
use crate::variant::VariantKind;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors reported by a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("file {0} not found")]
    FileNotFound(FileId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Task-state view used for admission and maintenance.
///
/// Reads here are privileged: they see every file regardless of owner.
#[async_trait]
pub trait TaskState: Send + Sync {
    /// True while an executor is actively processing some file.
    async fn is_busy(&self) -> Result<bool, StoreError>;

    /// Atomically claim the oldest QUEUED file, moving it to PROCESSING.
    async fn pop_next(&self) -> Result<Option<FileId>, StoreError>;

    /// Every file currently in PROCESSING.
    async fn list_processing(&self) -> Result<Vec<MediaFile>, StoreError>;

    /// Move a file to FAILED with the given notes.
    async fn mark_failed(&self, file_id: &FileId, notes: &str) -> Result<(), StoreError>;
}

/// Variant rows as persisted by the record store.
#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn list_variants(&self) -> Result<Vec<FileVariant>, StoreError>;

    /// Delete one row. Returns false if it was already gone.
    async fn delete_variant(&self, file_id: &FileId, kind: VariantKind) -> Result<bool, StoreError>;
}

/// Oldest QUEUED file, ties broken by id.
pub(crate) fn next_queued<'a>(files: impl Iterator<Item = &'a MediaFile>) -> Option<&'a MediaFile> {
    files
        .filter(|f| f.processing_status == ProcessingStatus::Queued)
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

/// Apply the claim transition to a file record.
pub(crate) fn claim(file: &mut MediaFile) {
    file.processing_status = ProcessingStatus::Processing;
    file.processing_progress = Some(0);
    file.updated_at = current_timestamp_ms();
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<FileId, MediaFile>,
    variants: Vec<FileVariant>,
}

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_file(&self, file: MediaFile) {
        let mut state = self.state.lock().await;
        state.files.insert(file.id.clone(), file);
    }

    pub async fn insert_variant(&self, variant: FileVariant) {
        let mut state = self.state.lock().await;
        state
            .variants
            .retain(|v| !(v.file_id == variant.file_id && v.variant == variant.variant));
        state.variants.push(variant);
    }

    pub async fn file(&self, file_id: &FileId) -> Option<MediaFile> {
        self.state.lock().await.files.get(file_id).cloned()
    }

    pub async fn variants(&self) -> Vec<FileVariant> {
        self.state.lock().await.variants.clone()
    }
}

#[async_trait]
impl TaskState for MemoryStore {
    async fn is_busy(&self) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .any(|f| f.processing_status == ProcessingStatus::Processing))
    }

    async fn pop_next(&self) -> Result<Option<FileId>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = next_queued(state.files.values()).map(|f| f.id.clone()) else {
            return Ok(None);
        };
        if let Some(file) = state.files.get_mut(&id) {
            claim(file);
        }
        Ok(Some(id))
    }

    async fn list_processing(&self) -> Result<Vec<MediaFile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .filter(|f| f.processing_status == ProcessingStatus::Processing)
            .cloned()
            .collect())
    }

    async fn mark_failed(&self, file_id: &FileId, notes: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let file = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| StoreError::FileNotFound(file_id.clone()))?;
        file.fail(notes);
        Ok(())
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn list_variants(&self) -> Result<Vec<FileVariant>, StoreError> {
        Ok(self.state.lock().await.variants.clone())
    }

    async fn delete_variant(&self, file_id: &FileId, kind: VariantKind) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.variants.len();
        state
            .variants
            .retain(|v| !(&v.file_id == file_id && v.variant == kind));
        Ok(state.variants.len() != before)
    }
}
