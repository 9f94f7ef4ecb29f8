//! Source probing with ffprobe.
//!
//! Trim and crop validation need the source duration and frame size; this
//! module runs ffprobe and reduces its JSON to a [`SourceInfo`].

use crate::modifications::SourceDimensions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("no video stream in source")]
    NoVideoStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the pipeline needs to know about a source before transforming it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// `None` when the container does not report a duration (still images).
    pub duration_secs: Option<f64>,
    pub has_audio: bool,
}

impl SourceInfo {
    pub fn dimensions(&self) -> SourceDimensions {
        SourceDimensions {
            width: self.width,
            height: self.height,
        }
    }
}

mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Output {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub duration: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }
}

/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`.
pub fn probe_source(path: &Path) -> Result<SourceInfo, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe JSON. The first video stream supplies the frame size; the
/// container duration wins over the stream duration.
pub fn parse_ffprobe_output(json_str: &str) -> Result<SourceInfo, ProbeError> {
    let parsed: ffprobe_json::Output =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = parsed.streams.unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;
    let has_audio = streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .or_else(|| video.duration.clone())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(SourceInfo {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration_secs,
        has_audio,
    })
}
