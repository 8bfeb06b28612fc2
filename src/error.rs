//! Error types for the pdf2txt library.
//!
//! Failures fall into two classes:
//!
//! * **Fatal**: the document as a whole cannot be converted. These are
//!   [`ExtractionError`], [`WriteError`] and the runtime start-up failures
//!   collected under [`Pdf2TxtError`], returned as `Err` from the top-level
//!   `convert*` functions.
//!
//! * **Per image**: [`ImageDecodeError`] and [`InferenceError`]. They are
//!   logged and recorded in [`crate::output::ImageResult`]; the run carries on
//!   (the image is skipped, or its description becomes the fallback marker).

use crate::stage::RunStage;
use std::path::PathBuf;
use thiserror::Error;

/// The PDF could not be opened or walked.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium failed while reading a specific page.
    #[error("Failed to read page {page} of '{path}': {detail}")]
    PageFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Page content handed to the pipeline is inconsistent (an image placed
    /// on the wrong page, or two images claiming the same position).
    #[error("Invalid content for page {page}: {detail}")]
    InvalidContent { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable or in the working directory,\n\
install it system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),
}

/// A single embedded image could not be turned into a file on disk.
///
/// Never fatal: the image is left out of the output.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageDecodeError {
    /// The embedded bytes are not an image format we can decode.
    #[error("Page {page}, block {sequence}: cannot decode image: {detail}")]
    Decode {
        page: usize,
        sequence: usize,
        detail: String,
    },

    /// The decoded image could not be written to the temporary directory.
    #[error("Page {page}, block {sequence}: cannot write '{path}': {detail}")]
    Write {
        page: usize,
        sequence: usize,
        path: PathBuf,
        detail: String,
    },
}

/// The vision runtime failed to describe one image.
///
/// Never fatal: the image position receives the fallback marker.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum InferenceError {
    /// The materialized image file could not be read back.
    #[error("cannot read image '{path}': {detail}")]
    ImageUnreadable { path: PathBuf, detail: String },

    /// The runtime answered with an error status (e.g. context overflow).
    #[error("runtime rejected the request (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request did not complete in time.
    #[error("inference timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Transport-level failure talking to the runtime.
    #[error("request to vision runtime failed: {0}")]
    Request(String),

    /// The runtime answered but produced no text.
    #[error("runtime returned an empty description")]
    EmptyResponse,
}

/// The output file could not be written.
#[derive(Debug, Error)]
#[error("Failed to write output file '{path}': {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// All fatal errors returned by the pdf2txt library.
#[derive(Debug, Error)]
pub enum Pdf2TxtError {
    /// The PDF could not be opened or walked.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The vision runtime could not be started.
    #[error("Failed to load vision model: {reason}\n{hint}")]
    ModelLoad { reason: String, hint: String },

    /// The output file could not be written.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// The run's temporary image directory could not be created.
    #[error("Failed to create temporary image directory: {0}")]
    TempDir(#[source] std::io::Error),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2TxtError {
    /// The pipeline stage this error aborts.
    pub fn stage(&self) -> RunStage {
        match self {
            Pdf2TxtError::Extraction(_) => RunStage::Extracting,
            Pdf2TxtError::TempDir(_) => RunStage::MaterializingImages,
            Pdf2TxtError::ModelLoad { .. } => RunStage::Describing,
            Pdf2TxtError::Write(_) => RunStage::Writing,
            Pdf2TxtError::InvalidConfig(_) | Pdf2TxtError::Internal(_) => RunStage::Initializing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_required_display() {
        let e = ExtractionError::PasswordRequired {
            path: PathBuf::from("/tmp/locked.pdf"),
        };
        let msg = e.to_string();
        assert!(msg.contains("locked.pdf"), "got: {msg}");
        assert!(msg.contains("--password"));
    }

    #[test]
    fn image_decode_display_names_position() {
        let e = ImageDecodeError::Decode {
            page: 3,
            sequence: 7,
            detail: "unsupported filter".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("block 7"), "got: {msg}");
    }

    #[test]
    fn inference_timeout_display() {
        let e = InferenceError::Timeout { secs: 300 };
        assert!(e.to_string().contains("300s"));
    }

    #[test]
    fn fatal_errors_map_to_stages() {
        let extraction: Pdf2TxtError = ExtractionError::FileNotFound {
            path: PathBuf::from("missing.pdf"),
        }
        .into();
        assert_eq!(extraction.stage(), RunStage::Extracting);

        let write: Pdf2TxtError = WriteError {
            path: PathBuf::from("/readonly/out.txt"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert_eq!(write.stage(), RunStage::Writing);

        let model = Pdf2TxtError::ModelLoad {
            reason: "llama-server exited".into(),
            hint: String::new(),
        };
        assert_eq!(model.stage(), RunStage::Describing);
    }

    #[test]
    fn transparent_extraction_keeps_message() {
        let e: Pdf2TxtError = ExtractionError::WrongPassword {
            path: PathBuf::from("a.pdf"),
        }
        .into();
        assert_eq!(e.to_string(), "Wrong password for PDF 'a.pdf'");
    }
}
