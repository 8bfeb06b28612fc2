//! # pdf2txt
//!
//! Convert PDF documents to plain text, replacing every embedded image with a
//! description written by a local vision-language model.
//!
//! ## Why this crate?
//!
//! Text extraction alone drops figures, charts and diagrams, which in
//! scientific papers often carry the result. This crate keeps the document's
//! text as-is and puts a textual description at each image's position, so the
//! output can be indexed, searched or fed to a text-only model without losing
//! what the figures showed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input        check path and %PDF magic
//!  ├─ 2. Extract      text and image blocks in page order (pdfium, spawn_blocking)
//!  ├─ 3. Materialize  each image → <token>.png in a temporary directory
//!  ├─ 4. Describe     one llama-server request per image, fallback on failure
//!  ├─ 5. Assemble     segments + descriptions → one string, pages in order
//!  └─ 6. Write        <stem>.txt next to the PDF (atomic)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2txt::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .vision_model_path("models/qwen2-vl-7b-q4_k_m.gguf")
//!         .clip_model_path("models/mmproj-qwen2-vl-7b-f16.gguf")
//!         .build()?;
//!     let output = convert_to_file("paper.pdf", &config).await?;
//!     eprintln!(
//!         "{} pages, {}/{} images described",
//!         output.stats.total_pages,
//!         output.stats.images_described,
//!         output.stats.images_found
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2txt = { version = "0.1", default-features = false }
//! ```
//!
//! ## Vision runtime
//!
//! By default a `llama-server` process (from llama.cpp) is started with the
//! configured model and projector files, used for the run, and stopped
//! afterwards. It is only started when the document contains at least one
//! image. Any other backend can be plugged in by implementing
//! [`VisionRuntime`] and passing it to
//! [`ConversionConfigBuilder::vision_runtime`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, PageSeparator, RuntimeOptions};
pub use convert::{
    convert, convert_pages, convert_pages_to_file, convert_sync, convert_to_file, inspect,
};
pub use document::{
    ContentBlock, Description, ImageBlock, ImageSource, ImageToken, PageContent, TextBlock,
};
pub use error::{ExtractionError, ImageDecodeError, InferenceError, Pdf2TxtError, WriteError};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, ImageResult};
pub use pipeline::describe::{LlamaServerRuntime, VisionRuntime};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{DEFAULT_IMAGE_PROMPT, FALLBACK_DESCRIPTION};
pub use stage::RunStage;

/// Re-exported so [`VisionRuntime`] can be implemented without a direct dependency.
pub use async_trait::async_trait;
