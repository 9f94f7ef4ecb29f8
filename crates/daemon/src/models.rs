//! Records the pipeline reads from the persistence collaborator.
//!
//! A [`MediaFile`] is one processing unit; each [`FileVariant`] is one
//! physical rendition of it under the storage root. The pipeline only reads
//! these records and writes the processing status fields.

use crate::variant::VariantKind;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a [`MediaFile`], assigned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Declared media type of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Video,
    Image,
    Gif,
    Audio,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Video => write!(f, "VIDEO"),
            MediaType::Image => write!(f, "IMAGE"),
            MediaType::Gif => write!(f, "GIF"),
            MediaType::Audio => write!(f, "AUDIO"),
        }
    }
}

/// Processing lifecycle of a file.
///
/// QUEUED at upload, PROCESSING once an executor claims it, then DONE or
/// FAILED.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    #[default]
    Queued,
    Processing,
    Done,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Queued => write!(f, "QUEUED"),
            ProcessingStatus::Processing => write!(f, "PROCESSING"),
            ProcessingStatus::Done => write!(f, "DONE"),
            ProcessingStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Pixels removed from each edge of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropMetadata {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Requested time window in seconds of the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimMetadata {
    pub start: f64,
    pub end: f64,
}

/// One persisted transform request. Either part may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimMetadata>,
}

/// A processing unit as stored by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: FileId,
    #[serde(rename = "type")]
    pub file_type: MediaType,
    /// Type at upload time; never changes.
    pub original_type: MediaType,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub processing_progress: Option<u8>,
    #[serde(default)]
    pub processing_notes: Option<String>,
    /// Opaque parameters used to (re)produce variants.
    #[serde(default)]
    pub processing_meta: serde_json::Value,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    /// Unix timestamp (milliseconds) when the file was uploaded.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the last status change.
    pub updated_at: i64,
}

impl MediaFile {
    /// A freshly uploaded file, QUEUED with no progress.
    pub fn new_queued(id: impl Into<FileId>, file_type: MediaType) -> Self {
        let now = current_timestamp_ms();
        Self {
            id: id.into(),
            file_type,
            original_type: file_type,
            processing_status: ProcessingStatus::Queued,
            processing_progress: None,
            processing_notes: None,
            processing_meta: serde_json::Value::Null,
            modifications: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the processing status and update timestamp.
    pub fn set_status(&mut self, status: ProcessingStatus) {
        self.processing_status = status;
        self.touch();
    }

    /// Mark the file as failed with a note.
    pub fn fail(&mut self, notes: &str) {
        self.processing_status = ProcessingStatus::Failed;
        self.processing_progress = None;
        self.processing_notes = Some(notes.to_string());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }
}

/// One physical rendition of a [`MediaFile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVariant {
    pub file_id: FileId,
    pub variant: VariantKind,
    pub extension: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl FileVariant {
    pub fn new(file_id: impl Into<FileId>, variant: VariantKind, extension: &str) -> Self {
        Self {
            file_id: file_id.into(),
            variant,
            extension: extension.trim_start_matches('.').to_string(),
            meta: serde_json::Value::Null,
        }
    }
}

/// Progress/status payload broadcast to subscribers of a file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_notes: Option<String>,
}

impl FileUpdate {
    pub fn progress(percent: u8) -> Self {
        Self {
            processing_status: Some(ProcessingStatus::Processing),
            processing_progress: Some(percent.min(100)),
            processing_notes: None,
        }
    }

    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Self::default()
        }
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
