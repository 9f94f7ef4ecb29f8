//! On-disk layout of the storage root.
//!
//! Every variant lives at `{root}/content/{file_id}/{variant}.{extension}`.
//! Uploads are staged under `{root}/queue/`. Files from before the content
//! directory migration sit in flat per-kind directories (`compressed/`,
//! `thumbnail/`, `original/`, `upic/`).
//!
//! All getters are pure functions of the root and their arguments.

use crate::models::FileId;
use crate::variant::VariantKind;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONTENT_DIR: &str = "content";
const QUEUE_DIR: &str = "queue";

/// Errors raised while preparing the storage root.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// A required directory path is occupied by something else.
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    /// An existing layout was expected but the directory is absent.
    #[error("{0} does not exist")]
    Missing(PathBuf),

    #[error("failed to create directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Flat directories used before per-file content directories existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyKind {
    Compressed,
    Thumbnail,
    Original,
    ProfilePictures,
}

impl LegacyKind {
    pub const ALL: [LegacyKind; 4] = [
        LegacyKind::Compressed,
        LegacyKind::Thumbnail,
        LegacyKind::Original,
        LegacyKind::ProfilePictures,
    ];

    pub const fn dir_name(self) -> &'static str {
        match self {
            LegacyKind::Compressed => "compressed",
            LegacyKind::Thumbnail => "thumbnail",
            LegacyKind::Original => "original",
            LegacyKind::ProfilePictures => "upic",
        }
    }
}

/// Path calculator rooted at the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    root: PathBuf,
}

impl PathLayout {
    /// Create the layout and make sure the root, content, queue and legacy
    /// directories exist.
    ///
    /// Safe to call repeatedly. Fails if any of those paths exists and is
    /// not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LayoutError> {
        let layout = Self::from_root(root);
        ensure_dir(&layout.root)?;
        ensure_dir(&layout.content_root())?;
        ensure_dir(&layout.queue_dir())?;
        for kind in LegacyKind::ALL {
            ensure_dir(&layout.legacy_dir(kind))?;
        }
        Ok(layout)
    }

    /// Layout over an existing root, without touching the filesystem.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Check that the root and content directories already exist.
    ///
    /// Creates nothing, so a mistyped root is reported instead of being
    /// replaced by an empty tree.
    pub fn verify(&self) -> Result<(), LayoutError> {
        expect_dir(&self.root)?;
        expect_dir(&self.content_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_root(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    /// Directory holding all variants of one file.
    pub fn content_dir(&self, file_id: &FileId) -> PathBuf {
        self.content_root().join(file_id.as_str())
    }

    /// `{root}/content/{file_id}/{variant}.{extension}`
    pub fn variant_path(&self, file_id: &FileId, variant: VariantKind, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        self.content_dir(file_id)
            .join(format!("{}.{}", variant.as_str(), extension))
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root.join(QUEUE_DIR)
    }

    /// Staging location of an upload waiting to be processed.
    pub fn queue_path(&self, file_id: &FileId) -> PathBuf {
        self.queue_dir().join(file_id.as_str())
    }

    pub fn legacy_dir(&self, kind: LegacyKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn legacy_path(&self, kind: LegacyKind, file_name: &str) -> PathBuf {
        self.legacy_dir(kind).join(file_name)
    }
}

/// Create `path` as a directory unless it already is one.
fn ensure_dir(path: &Path) -> Result<(), LayoutError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LayoutError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|source| LayoutError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(LayoutError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn expect_dir(path: &Path) -> Result<(), LayoutError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LayoutError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LayoutError::Missing(path.to_path_buf()))
        }
        Err(source) => Err(LayoutError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
