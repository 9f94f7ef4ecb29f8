//! Trim and crop parameters derived from a file's stored modifications.
//!
//! Only the first entry of the modification list is honored. Files carry at
//! most one crop and one trim today, so later entries are ignored rather
//! than merged.

use crate::models::{CropMetadata, Modification};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected trim or crop parameters. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModificationError {
    #[error("trim start must not be negative (got {start}s)")]
    NegativeStart { start: f64 },

    #[error("trim duration must be positive (got {duration}s)")]
    NonPositiveDuration { duration: f64 },

    #[error(
        "trim ends at {end}s but the source is only {source_duration}s long (exceeds by {exceeded_by}s)"
    )]
    ExceedsSource {
        end: f64,
        source_duration: f64,
        exceeded_by: f64,
    },

    #[error("trim requested but the source duration is unknown")]
    UnknownSourceDuration,

    #[error("crop leaves {width}x{height} of a {source_width}x{source_height} source")]
    CropOutOfBounds {
        width: i64,
        height: i64,
        source_width: u32,
        source_height: u32,
    },
}

/// Frame size of the source being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDimensions {
    pub width: u32,
    pub height: u32,
}

/// A trim resolved to an input seek and a duration, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimSpec {
    pub start: f64,
    pub duration: f64,
}

impl TrimSpec {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Trim requested by the first modification, if any.
///
/// `None` means no trim is needed.
pub fn extract_trim(modifications: &[Modification]) -> Option<TrimSpec> {
    let trim = modifications.first()?.trim?;
    Some(TrimSpec {
        start: trim.start,
        duration: trim.end - trim.start,
    })
}

/// Seek and duration flags for the transcoder.
///
/// These go before `-i` so the seek happens on the input side, which is
/// both faster and frame-accurate for re-encodes.
pub fn build_trim_input_options(trim: &TrimSpec) -> Vec<String> {
    vec![
        "-ss".to_string(),
        trim.start.to_string(),
        "-t".to_string(),
        trim.duration.to_string(),
    ]
}

/// Crop requested by the first modification, if any.
pub fn extract_crop(modifications: &[Modification]) -> Option<CropMetadata> {
    modifications.first()?.crop
}

/// Check a trim against the length of the source.
pub fn validate_trim(trim: &TrimSpec, source_duration_secs: f64) -> Result<(), ModificationError> {
    // Written as negations so NaN fails too.
    if !(trim.start >= 0.0) {
        return Err(ModificationError::NegativeStart { start: trim.start });
    }
    if !(trim.duration > 0.0) {
        return Err(ModificationError::NonPositiveDuration {
            duration: trim.duration,
        });
    }
    let end = trim.end();
    if end > source_duration_secs {
        return Err(ModificationError::ExceedsSource {
            end,
            source_duration: source_duration_secs,
            exceeded_by: end - source_duration_secs,
        });
    }
    Ok(())
}

/// Check that a crop leaves a non-empty frame. Returns the output size.
pub fn validate_crop(
    crop: &CropMetadata,
    source: SourceDimensions,
) -> Result<SourceDimensions, ModificationError> {
    let (width, height) = cropped_size(crop, source);
    if width <= 0 || height <= 0 {
        return Err(ModificationError::CropOutOfBounds {
            width,
            height,
            source_width: source.width,
            source_height: source.height,
        });
    }
    Ok(SourceDimensions {
        width: width as u32,
        height: height as u32,
    })
}

/// Output width and height of a crop; negative when the edges overlap.
pub(crate) fn cropped_size(crop: &CropMetadata, source: SourceDimensions) -> (i64, i64) {
    let width = i64::from(source.width) - i64::from(crop.left) - i64::from(crop.right);
    let height = i64::from(source.height) - i64::from(crop.top) - i64::from(crop.bottom);
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrimMetadata;
    use proptest::prelude::*;

    fn trim_mod(start: f64, end: f64) -> Modification {
        Modification {
            crop: None,
            trim: Some(TrimMetadata { start, end }),
        }
    }

    fn crop_mod(left: u32, top: u32, right: u32, bottom: u32) -> Modification {
        Modification {
            crop: Some(CropMetadata {
                left,
                top,
                right,
                bottom,
            }),
            trim: None,
        }
    }

    #[test]
    fn test_extract_trim_absent() {
        assert_eq!(extract_trim(&[]), None);
        assert_eq!(extract_trim(&[crop_mod(1, 1, 1, 1)]), None);
    }

    #[test]
    fn test_extract_trim_computes_duration() {
        let trim = extract_trim(&[trim_mod(2.5, 10.0)]).unwrap();
        assert_eq!(trim, TrimSpec { start: 2.5, duration: 7.5 });
    }

    #[test]
    fn test_only_first_modification_is_honored() {
        let mods = vec![crop_mod(4, 4, 4, 4), trim_mod(0.0, 3.0)];
        assert_eq!(extract_trim(&mods), None);
        assert_eq!(extract_crop(&mods).map(|c| c.left), Some(4));

        let mods = vec![trim_mod(0.0, 3.0), crop_mod(4, 4, 4, 4)];
        assert!(extract_trim(&mods).is_some());
        assert_eq!(extract_crop(&mods), None);
    }

    #[test]
    fn test_trim_input_options() {
        let opts = build_trim_input_options(&TrimSpec {
            start: 1.5,
            duration: 4.0,
        });
        assert_eq!(opts, vec!["-ss", "1.5", "-t", "4"]);
    }

    #[test]
    fn test_validate_trim_cases() {
        assert!(matches!(
            validate_trim(&TrimSpec { start: -1.0, duration: 5.0 }, 10.0),
            Err(ModificationError::NegativeStart { .. })
        ));
        assert!(matches!(
            validate_trim(&TrimSpec { start: 2.0, duration: 0.0 }, 10.0),
            Err(ModificationError::NonPositiveDuration { .. })
        ));
        match validate_trim(&TrimSpec { start: 0.0, duration: 20.0 }, 10.0) {
            Err(ModificationError::ExceedsSource { exceeded_by, .. }) => {
                assert!((exceeded_by - 10.0).abs() < f64::EPSILON)
            }
            other => panic!("expected ExceedsSource, got {:?}", other),
        }
        assert!(validate_trim(&TrimSpec { start: 0.0, duration: 5.0 }, 10.0).is_ok());
        assert!(validate_trim(&TrimSpec { start: 5.0, duration: 5.0 }, 10.0).is_ok());
    }

    #[test]
    fn test_validate_trim_rejects_nan() {
        assert!(validate_trim(&TrimSpec { start: f64::NAN, duration: 1.0 }, 10.0).is_err());
        assert!(validate_trim(&TrimSpec { start: 0.0, duration: f64::NAN }, 10.0).is_err());
    }

    #[test]
    fn test_validate_crop() {
        let source = SourceDimensions {
            width: 1920,
            height: 1080,
        };
        let crop = CropMetadata {
            left: 10,
            top: 5,
            right: 10,
            bottom: 5,
        };
        assert_eq!(
            validate_crop(&crop, source),
            Ok(SourceDimensions {
                width: 1900,
                height: 1070
            })
        );

        let too_wide = CropMetadata {
            left: 1000,
            top: 0,
            right: 920,
            bottom: 0,
        };
        assert!(matches!(
            validate_crop(&too_wide, source),
            Err(ModificationError::CropOutOfBounds { width: 0, .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_validate_trim_matches_bounds(
            start in -10.0f64..100.0,
            duration in -10.0f64..100.0,
            source in 0.1f64..150.0,
        ) {
            let result = validate_trim(&TrimSpec { start, duration }, source);
            let valid = start >= 0.0 && duration > 0.0 && start + duration <= source;
            prop_assert_eq!(result.is_ok(), valid);
        }
    }
}
