//! Variant kinds and the modifiable/unmodified pairing between them.
//!
//! Three kinds can be regenerated with user modifications. Before that
//! happens their pristine bytes are kept under a paired "unmodified" kind.
//! The pairing is a fixed table expressed through [`VariantRole`]; nothing
//! is inferred from the kind's name.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Closed set of physical renditions a file can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantKind {
    Original,
    Compressed,
    CompressedGif,
    UnmodifiedCompressed,
    UnmodifiedCompressedGif,
    Thumbnail,
    ThumbnailPoster,
    UnmodifiedThumbnailPoster,
}

/// Where a kind sits in the modification pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantRole {
    /// Never modified and never a preserved copy.
    Plain,
    /// Can be regenerated with modifications; pristine bytes go to `unmodified`.
    Modifiable { unmodified: VariantKind },
    /// Preserved pristine copy of `original`.
    Unmodified { original: VariantKind },
}

impl VariantKind {
    pub const ALL: [VariantKind; 8] = [
        VariantKind::Original,
        VariantKind::Compressed,
        VariantKind::CompressedGif,
        VariantKind::UnmodifiedCompressed,
        VariantKind::UnmodifiedCompressedGif,
        VariantKind::Thumbnail,
        VariantKind::ThumbnailPoster,
        VariantKind::UnmodifiedThumbnailPoster,
    ];

    /// Name used in storage paths and persisted rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            VariantKind::Original => "ORIGINAL",
            VariantKind::Compressed => "COMPRESSED",
            VariantKind::CompressedGif => "COMPRESSED_GIF",
            VariantKind::UnmodifiedCompressed => "UNMODIFIED_COMPRESSED",
            VariantKind::UnmodifiedCompressedGif => "UNMODIFIED_COMPRESSED_GIF",
            VariantKind::Thumbnail => "THUMBNAIL",
            VariantKind::ThumbnailPoster => "THUMBNAIL_POSTER",
            VariantKind::UnmodifiedThumbnailPoster => "UNMODIFIED_THUMBNAIL_POSTER",
        }
    }

    pub const fn role(self) -> VariantRole {
        match self {
            VariantKind::Compressed => VariantRole::Modifiable {
                unmodified: VariantKind::UnmodifiedCompressed,
            },
            VariantKind::CompressedGif => VariantRole::Modifiable {
                unmodified: VariantKind::UnmodifiedCompressedGif,
            },
            VariantKind::ThumbnailPoster => VariantRole::Modifiable {
                unmodified: VariantKind::UnmodifiedThumbnailPoster,
            },
            VariantKind::UnmodifiedCompressed => VariantRole::Unmodified {
                original: VariantKind::Compressed,
            },
            VariantKind::UnmodifiedCompressedGif => VariantRole::Unmodified {
                original: VariantKind::CompressedGif,
            },
            VariantKind::UnmodifiedThumbnailPoster => VariantRole::Unmodified {
                original: VariantKind::ThumbnailPoster,
            },
            VariantKind::Original | VariantKind::Thumbnail => VariantRole::Plain,
        }
    }

    /// Paired unmodified kind, for the three modifiable kinds only.
    pub const fn unmodified(self) -> Option<VariantKind> {
        match self.role() {
            VariantRole::Modifiable { unmodified } => Some(unmodified),
            _ => None,
        }
    }

    /// True iff this kind holds preserved pre-modification bytes.
    pub const fn is_unmodified(self) -> bool {
        matches!(self.role(), VariantRole::Unmodified { .. })
    }

    /// Inverse of [`VariantKind::unmodified`].
    pub const fn original(self) -> Option<VariantKind> {
        match self.role() {
            VariantRole::Unmodified { original } => Some(original),
            _ => None,
        }
    }

    pub const fn is_modifiable(self) -> bool {
        matches!(self.role(), VariantRole::Modifiable { .. })
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown variant name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant kind: {0}")]
pub struct UnknownVariantKind(pub String);

impl FromStr for VariantKind {
    type Err = UnknownVariantKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariantKind(s.to_string()))
    }
}

/// The kinds that have an unmodified counterpart.
pub fn modifiable_kinds() -> [VariantKind; 3] {
    [
        VariantKind::Compressed,
        VariantKind::CompressedGif,
        VariantKind::ThumbnailPoster,
    ]
}
