//! Ordered chain of transcoder video filters.
//!
//! Filters are rendered in the order they were added. The builder does not
//! validate crop bounds; use [`crate::modifications::validate_crop`] first.

use crate::models::CropMetadata;
use crate::modifications::{cropped_size, SourceDimensions};

/// Frame rate used for animated GIF output.
pub const GIF_FPS: u32 = 25;

/// Labels of the two streams the GIF split produces, consumed by the
/// palette generation and palette use passes.
pub const GIF_SPLIT_LABELS: [&str; 2] = ["s0", "s1"];

/// Default input and output labels for [`FilterGraphBuilder::build_default_graph`].
pub const DEFAULT_INPUT_LABEL: &str = "0:v";
pub const DEFAULT_OUTPUT_LABEL: &str = "v";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGraphBuilder {
    filters: Vec<String>,
}

impl FilterGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `crop=<w>:<h>:<left>:<top>` with the size left after removing each edge.
    pub fn add_crop(&mut self, crop: &CropMetadata, source: SourceDimensions) -> &mut Self {
        let (width, height) = cropped_size(crop, source);
        self.filters
            .push(format!("crop={}:{}:{}:{}", width, height, crop.left, crop.top));
        self
    }

    /// Scale to a size spec.
    ///
    /// `?xH` keeps the aspect ratio (`scale=-2:H`); `WxH` is passed through
    /// as `scale=WxH`. Anything else is ignored.
    pub fn add_scale(&mut self, size: &str) -> &mut Self {
        if let Some(filter) = scale_filter(size) {
            self.filters.push(filter);
        }
        self
    }

    /// Frame rate, width, and a split into the two palette pass streams.
    pub fn add_gif_optimization(&mut self, width: u32) -> &mut Self {
        self.filters.push(format!("fps={}", GIF_FPS));
        self.filters.push(format!("scale={}:-2", width));
        self.filters.push(format!(
            "split[{}][{}]",
            GIF_SPLIT_LABELS[0], GIF_SPLIT_LABELS[1]
        ));
        self
    }

    pub fn add_custom_filter(&mut self, filter: impl Into<String>) -> &mut Self {
        self.filters.push(filter.into());
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn count(&self) -> usize {
        self.filters.len()
    }

    /// The filters as a flat list, e.g. for `-vf`.
    pub fn build(&self) -> Vec<String> {
        self.filters.clone()
    }

    /// `[input]f1,f2,...[output]`, or an empty string with no filters.
    pub fn build_filter_graph(&self, input_label: &str, output_label: &str) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        format!(
            "[{}]{}[{}]",
            input_label,
            self.filters.join(","),
            output_label
        )
    }

    /// [`FilterGraphBuilder::build_filter_graph`] with `0:v` and `v`.
    pub fn build_default_graph(&self) -> String {
        self.build_filter_graph(DEFAULT_INPUT_LABEL, DEFAULT_OUTPUT_LABEL)
    }
}

fn scale_filter(size: &str) -> Option<String> {
    let (width, height) = size.split_once('x')?;
    if !is_dimension(height) {
        return None;
    }
    if width == "?" {
        Some(format!("scale=-2:{}", height))
    } else if is_dimension(width) {
        Some(format!("scale={}", size))
    } else {
        None
    }
}

fn is_dimension(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
