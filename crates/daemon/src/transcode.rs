//! Transcoder command planning.
//!
//! Turns a file's stored modifications and its probed source into an ffmpeg
//! invocation. Trim flags go before `-i` so the seek happens on the input
//! side; crop and scale are rendered as one filter graph. Nothing here runs
//! the command.

use crate::filter_graph::{FilterGraphBuilder, DEFAULT_OUTPUT_LABEL};
use crate::models::Modification;
use crate::modifications::{
    build_trim_input_options, extract_crop, extract_trim, validate_crop, validate_trim,
    ModificationError, TrimSpec,
};
use crate::probe::SourceInfo;
use std::path::Path;
use std::process::Command;

/// Inputs for one transcode.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub modifications: &'a [Modification],
    pub source: SourceInfo,
    /// Size spec for the scale filter, e.g. `?x720` or `1280x720`.
    pub size: Option<&'a str>,
}

/// Validated pieces of a transcode, before they become arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodePlan {
    pub trim: Option<TrimSpec>,
    pub filters: FilterGraphBuilder,
}

/// Validate the modifications against the source and build the filters.
pub fn plan_transcode(request: &TranscodeRequest<'_>) -> Result<TranscodePlan, ModificationError> {
    let trim = extract_trim(request.modifications);
    if let Some(trim) = &trim {
        let duration = request
            .source
            .duration_secs
            .ok_or(ModificationError::UnknownSourceDuration)?;
        validate_trim(trim, duration)?;
    }

    let mut filters = FilterGraphBuilder::new();
    if let Some(crop) = extract_crop(request.modifications) {
        validate_crop(&crop, request.source.dimensions())?;
        filters.add_crop(&crop, request.source.dimensions());
    }
    if let Some(size) = request.size {
        filters.add_scale(size);
    }

    Ok(TranscodePlan { trim, filters })
}

/// Ordered ffmpeg arguments for a request.
pub fn build_transcode_args(request: &TranscodeRequest<'_>) -> Result<Vec<String>, ModificationError> {
    let plan = plan_transcode(request)?;
    let mut args = vec!["-y".to_string()];

    if let Some(trim) = &plan.trim {
        args.extend(build_trim_input_options(trim));
    }
    args.push("-i".to_string());
    args.push(request.input.display().to_string());

    if plan.filters.has_filters() {
        args.push("-filter_complex".to_string());
        args.push(plan.filters.build_default_graph());
        args.push("-map".to_string());
        args.push(format!("[{}]", DEFAULT_OUTPUT_LABEL));
        if request.source.has_audio {
            args.push("-map".to_string());
            args.push("0:a?".to_string());
        }
    }

    args.push(request.output.display().to_string());
    Ok(args)
}

pub fn build_transcode_command(request: &TranscodeRequest<'_>) -> Result<Command, ModificationError> {
    let args = build_transcode_args(request)?;
    let mut cmd = Command::new("ffmpeg");
    cmd.args(args);
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CropMetadata, TrimMetadata};

    const SOURCE: SourceInfo = SourceInfo {
        width: 1920,
        height: 1080,
        duration_secs: Some(30.0),
        has_audio: true,
    };

    fn request<'a>(mods: &'a [Modification], size: Option<&'a str>) -> TranscodeRequest<'a> {
        TranscodeRequest {
            input: Path::new("/in/source.mov"),
            output: Path::new("/out/COMPRESSED.mp4"),
            modifications: mods,
            source: SOURCE,
            size,
        }
    }

    #[test]
    fn test_plain_transcode() {
        let args = build_transcode_args(&request(&[], None)).unwrap();
        assert_eq!(args, vec!["-y", "-i", "/in/source.mov", "/out/COMPRESSED.mp4"]);
    }

    #[test]
    fn test_trim_is_placed_before_input() {
        let mods = [Modification {
            crop: None,
            trim: Some(TrimMetadata { start: 2.0, end: 7.5 }),
        }];
        let args = build_transcode_args(&request(&mods, None)).unwrap();
        assert_eq!(
            args,
            vec!["-y", "-ss", "2", "-t", "5.5", "-i", "/in/source.mov", "/out/COMPRESSED.mp4"]
        );
    }

    #[test]
    fn test_crop_and_scale_graph() {
        let mods = [Modification {
            crop: Some(CropMetadata {
                left: 10,
                top: 5,
                right: 10,
                bottom: 5,
            }),
            trim: None,
        }];
        let cmd = build_transcode_command(&request(&mods, Some("?x720"))).unwrap();
        assert_eq!(cmd.get_program(), "ffmpeg");

        let args: Vec<String> = cmd
            .get_args()
            .filter_map(|a| a.to_str().map(String::from))
            .collect();
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/in/source.mov",
                "-filter_complex",
                "[0:v]crop=1900:1070:10:5,scale=-2:720[v]",
                "-map",
                "[v]",
                "-map",
                "0:a?",
                "/out/COMPRESSED.mp4",
            ]
        );
    }

    #[test]
    fn test_invalid_modifications_are_rejected() {
        let too_long = [Modification {
            crop: None,
            trim: Some(TrimMetadata { start: 0.0, end: 45.0 }),
        }];
        assert!(matches!(
            build_transcode_args(&request(&too_long, None)),
            Err(ModificationError::ExceedsSource { .. })
        ));

        let mut still = request(&too_long, None);
        still.source.duration_secs = None;
        assert_eq!(
            build_transcode_args(&still),
            Err(ModificationError::UnknownSourceDuration)
        );

        let empty_crop = [Modification {
            crop: Some(CropMetadata {
                left: 0,
                top: 600,
                right: 0,
                bottom: 600,
            }),
            trim: None,
        }];
        assert!(matches!(
            plan_transcode(&request(&empty_crop, None)),
            Err(ModificationError::CropOutOfBounds { .. })
        ));
    }
}
