//! Keeping pristine bytes when a variant is regenerated.
//!
//! Before a modifiable variant is rebuilt with a crop or trim, its current
//! file is moved to the paired unmodified kind in the same content
//! directory. Restoring moves it back.

use crate::models::FileVariant;
use crate::paths::PathLayout;
use crate::variant::VariantKind;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreserveError {
    #[error("{0} has no unmodified counterpart")]
    NotModifiable(VariantKind),

    #[error("{0} is not an unmodified variant")]
    NotUnmodified(VariantKind),

    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("target already exists: {0}")]
    TargetExists(PathBuf),

    #[error("failed to move {from} to {to}: {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Move a modifiable variant's file to its unmodified kind.
///
/// Returns the row describing the preserved copy.
pub fn preserve_unmodified(
    layout: &PathLayout,
    variant: &FileVariant,
) -> Result<FileVariant, PreserveError> {
    let target = variant
        .variant
        .unmodified()
        .ok_or(PreserveError::NotModifiable(variant.variant))?;
    relocate(layout, variant, target)
}

/// Move a preserved copy back to the kind it was taken from.
pub fn restore_unmodified(
    layout: &PathLayout,
    variant: &FileVariant,
) -> Result<FileVariant, PreserveError> {
    let target = variant
        .variant
        .original()
        .ok_or(PreserveError::NotUnmodified(variant.variant))?;
    relocate(layout, variant, target)
}

fn relocate(
    layout: &PathLayout,
    variant: &FileVariant,
    target: VariantKind,
) -> Result<FileVariant, PreserveError> {
    let from = layout.variant_path(&variant.file_id, variant.variant, &variant.extension);
    let to = layout.variant_path(&variant.file_id, target, &variant.extension);

    if !from.exists() {
        return Err(PreserveError::SourceMissing(from));
    }
    if to.exists() {
        return Err(PreserveError::TargetExists(to));
    }

    move_file(&from, &to).map_err(|source| PreserveError::MoveFailed {
        from: from.clone(),
        to: to.clone(),
        source,
    })?;

    tracing::debug!(
        file_id = %variant.file_id,
        from = %variant.variant,
        to = %target,
        "Relocated variant file"
    );

    Ok(FileVariant {
        file_id: variant.file_id.clone(),
        variant: target,
        extension: variant.extension.clone(),
        meta: variant.meta.clone(),
    })
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
