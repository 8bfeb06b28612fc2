//! Result types returned by the conversion entry points.

use crate::document::{Description, ImageToken};
use crate::error::{ImageDecodeError, InferenceError};
use serde::Serialize;
use std::path::PathBuf;

/// Everything a conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The assembled document.
    pub text: String,
    /// One record per image block found, in document order.
    pub images: Vec<ImageResult>,
    pub stats: ConversionStats,
    /// Where the run's temporary images lived. Removed by the time this
    /// value is returned.
    pub temp_dir: PathBuf,
    /// Set when the text was written to disk.
    pub output_path: Option<PathBuf>,
}

/// Outcome for a single image block.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    pub token: ImageToken,
    /// 1-indexed page number.
    pub page_num: usize,
    /// `None` when the image was skipped before description.
    pub description: Option<Description>,
    /// Set when the image could not be materialized (and was skipped).
    pub decode_error: Option<ImageDecodeError>,
    /// Set when description failed (and the fallback was used).
    pub inference_error: Option<InferenceError>,
    /// Wall-clock time spent describing this image.
    pub duration_ms: u64,
}

impl ImageResult {
    pub fn is_skipped(&self) -> bool {
        self.decode_error.is_some()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.description, Some(Description::Fallback))
    }
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Image blocks found by extraction.
    pub images_found: usize,
    /// Images written to the temporary directory.
    pub images_materialized: usize,
    /// Images with a generated description.
    pub images_described: usize,
    /// Images whose position received the fallback marker.
    pub images_fallback: usize,
    /// Images skipped because they could not be decoded.
    pub images_skipped: usize,
    pub total_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub describe_duration_ms: u64,
}

/// PDF information shown by `inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub image_count: usize,
    pub pdf_version: String,
}
