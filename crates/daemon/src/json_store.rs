//! File-backed record store.
//!
//! Each file record is saved as `{state_dir}/files/{id}.json` and its
//! variant rows as `{state_dir}/variants/{id}.json`. Records that fail to
//! parse are skipped with a warning so one corrupt file never hides the
//! rest. All operations on one store are serialized by an internal lock,
//! which is what makes `pop_next` atomic within a process.

use crate::models::{FileId, FileVariant, MediaFile, ProcessingStatus};
use crate::store::{claim, next_queued, StoreError, TaskState, VariantStore};
use crate::variant::VariantKind;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const FILES_DIR: &str = "files";
const VARIANTS_DIR: &str = "variants";

#[derive(Debug)]
pub struct JsonStore {
    state_dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    /// Open a store rooted at `state_dir`, creating its directories.
    pub async fn open(state_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let state_dir = state_dir.into();
        for dir in [state_dir.join(FILES_DIR), state_dir.join(VARIANTS_DIR)] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| StoreError::Io { path: dir.clone(), source })?;
        }
        Ok(Self {
            state_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn file_path(&self, file_id: &FileId) -> PathBuf {
        self.state_dir
            .join(FILES_DIR)
            .join(format!("{}.json", file_id))
    }

    fn variants_path(&self, file_id: &FileId) -> PathBuf {
        self.state_dir
            .join(VARIANTS_DIR)
            .join(format!("{}.json", file_id))
    }

    /// Save a file record, replacing any previous version.
    pub async fn save_file(&self, file: &MediaFile) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        write_record(&self.file_path(&file.id), file).await
    }

    /// Add or replace one variant row.
    pub async fn save_variant(&self, variant: &FileVariant) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.variants_path(&variant.file_id);
        let mut rows: Vec<FileVariant> = read_record_or_default(&path).await?;
        rows.retain(|v| v.variant != variant.variant);
        rows.push(variant.clone());
        write_record(&path, &rows).await
    }

    pub async fn load_file(&self, file_id: &FileId) -> Result<Option<MediaFile>, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.file_path(file_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn load_files(&self) -> Result<Vec<MediaFile>, StoreError> {
        load_records(&self.state_dir.join(FILES_DIR)).await
    }
}

#[async_trait]
impl TaskState for JsonStore {
    async fn is_busy(&self) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let files = self.load_files().await?;
        Ok(files
            .iter()
            .any(|f| f.processing_status == ProcessingStatus::Processing))
    }

    async fn pop_next(&self) -> Result<Option<FileId>, StoreError> {
        let _guard = self.lock.lock().await;
        let files = self.load_files().await?;
        let Some(mut file) = next_queued(files.iter()).cloned() else {
            return Ok(None);
        };
        claim(&mut file);
        write_record(&self.file_path(&file.id), &file).await?;
        Ok(Some(file.id))
    }

    async fn list_processing(&self) -> Result<Vec<MediaFile>, StoreError> {
        let _guard = self.lock.lock().await;
        let files = self.load_files().await?;
        Ok(files
            .into_iter()
            .filter(|f| f.processing_status == ProcessingStatus::Processing)
            .collect())
    }

    async fn mark_failed(&self, file_id: &FileId, notes: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.file_path(file_id);
        let mut file: MediaFile = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::FileNotFound(file_id.clone()))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        file.fail(notes);
        write_record(&path, &file).await
    }
}

#[async_trait]
impl VariantStore for JsonStore {
    async fn list_variants(&self) -> Result<Vec<FileVariant>, StoreError> {
        let _guard = self.lock.lock().await;
        let groups: Vec<Vec<FileVariant>> =
            load_records(&self.state_dir.join(VARIANTS_DIR)).await?;
        Ok(groups.into_iter().flatten().collect())
    }

    async fn delete_variant(&self, file_id: &FileId, kind: VariantKind) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.variants_path(file_id);
        let mut rows: Vec<FileVariant> = read_record_or_default(&path).await?;
        let before = rows.len();
        rows.retain(|v| v.variant != kind);
        if rows.len() == before {
            return Ok(false);
        }
        write_record(&path, &rows).await?;
        Ok(true)
    }
}

async fn write_record<T: Serialize + ?Sized>(path: &Path, record: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_record_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Load every `.json` record in `dir`, skipping ones that fail to parse.
async fn load_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut records = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(io_err(e)),
    };

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let parsed = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<T>(&content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Skipping unreadable record");
            }
        }
    }

    Ok(records)
}
