//! Progress-callback trait for per-image conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the document. The CLI uses this to
//! drive its progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pdf2txt::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     described: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, description_len: usize) {
//!         self.described.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{} described ({} chars)", index, total, description_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     described: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes the document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Images are processed one at a time, in document
/// order, so events for different images never interleave.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once extraction and materialization are done.
    ///
    /// # Arguments
    /// * `total_pages`: pages in the document
    /// * `total_images`: images that will be sent to the vision model
    fn on_extraction_complete(&self, total_pages: usize, total_images: usize) {
        let _ = (total_pages, total_images);
    }

    /// Called just before an image is sent to the vision model.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position among the images to describe
    /// * `total`: number of images to describe
    /// * `token`: the image's token, e.g. `p3-b2`
    fn on_image_start(&self, index: usize, total: usize, token: &str) {
        let _ = (index, total, token);
    }

    /// Called when an image was described.
    fn on_image_complete(&self, index: usize, total: usize, description_len: usize) {
        let _ = (index, total, description_len);
    }

    /// Called when describing an image failed and the fallback was used.
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the output has been assembled.
    ///
    /// # Arguments
    /// * `total_images`: images sent to the vision model
    /// * `described`: images that received a generated description
    fn on_conversion_complete(&self, total_images: usize, described: usize) {
        let _ = (total_images, described);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
