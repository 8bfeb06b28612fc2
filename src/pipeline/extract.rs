//! Structural extraction: walk a PDF page by page into ordered content blocks.
//!
//! pdfium exposes each page as a list of page objects in content-stream
//! order. Text objects are usually fragments (a word, a line, a run with one
//! font), so consecutive fragments are merged into one [`TextBlock`] until an
//! image object interrupts them. Paths, shadings and other drawing objects
//! carry no text and are ignored.
//!
//! pdfium is not async-safe; everything here is blocking. Async callers go
//! through `tokio::task::spawn_blocking` (see [`extract_metadata`] and
//! [`crate::convert`]).

use crate::document::{ContentBlock, ImageBlock, ImageSource, PageContent, TextBlock};
use crate::error::ExtractionError;
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Baseline shift (in PDF points) above which two fragments are on different lines.
const LINE_TOLERANCE_PT: f32 = 2.0;

/// Bind to a pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (a library file or the directory
/// containing it), the working directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(custom) => {
            let custom = PathBuf::from(custom);
            let lib = if custom.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&custom)
            } else {
                custom
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Owns the pdfium binding for the duration of an extraction.
pub struct PdfExtractor {
    pdfium: Pdfium,
}

impl PdfExtractor {
    /// Bind pdfium (see [`bind_pdfium`]).
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
        })
    }

    /// Load a document. Read-only.
    ///
    /// pdfium keeps the password for the lifetime of the document.
    pub fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<ExtractedDocument<'a>, ExtractionError> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| classify_load_error(path, password, e))?;

        info!(
            "PDF loaded: {} ({} pages)",
            path.display(),
            document.pages().len()
        );

        Ok(ExtractedDocument {
            path: path.to_path_buf(),
            document,
        })
    }
}

/// Map a pdfium load failure onto the extraction taxonomy.
fn classify_load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> ExtractionError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            ExtractionError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            ExtractionError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        ExtractionError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// An opened PDF whose pages can be walked lazily.
pub struct ExtractedDocument<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
}

impl<'a> ExtractedDocument<'a> {
    pub fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    /// Pages in ascending order, each read only when the iterator reaches it.
    pub fn pages(
        &self,
    ) -> impl Iterator<Item = Result<PageContent, ExtractionError>> + use<'_, 'a> {
        (0..self.page_count()).map(move |idx| self.read_page(idx))
    }

    fn read_page(&self, page_index: usize) -> Result<PageContent, ExtractionError> {
        let page = self
            .document
            .pages()
            .get(page_index as u16)
            .map_err(|e| ExtractionError::PageFailed {
                path: self.path.clone(),
                page: page_index + 1,
                detail: format!("{:?}", e),
            })?;

        let content = page_blocks(page_index, &page);
        debug!(
            "Page {}: {} blocks ({} images)",
            page_index + 1,
            content.blocks.len(),
            content.image_count()
        );
        Ok(content)
    }

    /// Document information dictionary plus page and image counts.
    pub fn metadata(&self) -> DocumentMetadata {
        let metadata = self.document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().trim().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let image_count = self
            .document
            .pages()
            .iter()
            .map(|page| {
                page.objects()
                    .iter()
                    .filter(|object| object.as_image_object().is_some())
                    .count()
            })
            .sum();

        DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            page_count: self.page_count(),
            image_count,
            pdf_version: format!("{:?}", self.document.version()),
        }
    }
}

/// Walk one page's objects into ordered blocks.
fn page_blocks(page_index: usize, page: &PdfPage) -> PageContent {
    let mut blocks = Vec::new();
    let mut text = TextAccumulator::default();

    for object in page.objects().iter() {
        if let Some(text_object) = object.as_text_object() {
            let baseline = object.bounds().ok().map(|b| b.bottom().value);
            text.push(&text_object.text(), baseline);
        } else if let Some(image_object) = object.as_image_object() {
            if let Some(t) = text.take() {
                blocks.push(ContentBlock::Text(TextBlock {
                    page_index,
                    text: t,
                }));
            }
            let source = match image_object.get_raw_image() {
                Ok(img) => ImageSource::Pixels(img),
                Err(e) => ImageSource::Unreadable(format!("{:?}", e)),
            };
            blocks.push(ContentBlock::Image(ImageBlock {
                page_index,
                sequence: blocks.len(),
                source,
            }));
        }
    }

    if let Some(t) = text.take() {
        blocks.push(ContentBlock::Text(TextBlock {
            page_index,
            text: t,
        }));
    }

    PageContent { page_index, blocks }
}

/// Joins text fragments: a space within a line, a newline across lines.
#[derive(Debug, Default)]
struct TextAccumulator {
    buf: String,
    last_baseline: Option<f32>,
}

impl TextAccumulator {
    fn push(&mut self, fragment: &str, baseline: Option<f32>) {
        if fragment.trim().is_empty() {
            return;
        }
        if !self.buf.is_empty() {
            let new_line = match (self.last_baseline, baseline) {
                (Some(prev), Some(cur)) => (prev - cur).abs() > LINE_TOLERANCE_PT,
                _ => false,
            };
            if new_line {
                self.buf.truncate(self.buf.trim_end().len());
                self.buf.push('\n');
            } else if !self.buf.ends_with(char::is_whitespace)
                && !fragment.starts_with(char::is_whitespace)
            {
                self.buf.push(' ');
            }
        }
        self.buf.push_str(fragment);
        if baseline.is_some() {
            self.last_baseline = baseline;
        }
    }

    /// Take the accumulated block, if it has any content.
    fn take(&mut self) -> Option<String> {
        self.last_baseline = None;
        let text = std::mem::take(&mut self.buf);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Read document metadata without walking page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, crate::error::Pdf2TxtError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    let result = tokio::task::spawn_blocking(move || -> Result<_, ExtractionError> {
        let extractor = PdfExtractor::new()?;
        let document = extractor.open(&path, pwd.as_deref())?;
        Ok(document.metadata())
    })
    .await
    .map_err(|e| crate::error::Pdf2TxtError::Internal(format!("Metadata task panicked: {}", e)))?;

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_on_one_line_join_with_space() {
        let mut acc = TextAccumulator::default();
        acc.push("Hello", Some(700.0));
        acc.push("world", Some(700.5));
        assert_eq!(acc.take().as_deref(), Some("Hello world"));
    }

    #[test]
    fn baseline_change_starts_new_line() {
        let mut acc = TextAccumulator::default();
        acc.push("First line ", Some(700.0));
        acc.push("Second line", Some(686.0));
        assert_eq!(acc.take().as_deref(), Some("First line\nSecond line"));
    }

    #[test]
    fn existing_whitespace_is_not_doubled() {
        let mut acc = TextAccumulator::default();
        acc.push("alpha ", Some(10.0));
        acc.push("beta", Some(10.0));
        assert_eq!(acc.take().as_deref(), Some("alpha beta"));
    }

    #[test]
    fn blank_fragments_are_dropped() {
        let mut acc = TextAccumulator::default();
        acc.push("   ", Some(10.0));
        assert_eq!(acc.take(), None);
    }

    #[test]
    fn take_resets_state() {
        let mut acc = TextAccumulator::default();
        acc.push("one", Some(10.0));
        assert_eq!(acc.take().as_deref(), Some("one"));
        acc.push("two", Some(500.0));
        assert_eq!(acc.take().as_deref(), Some("two"));
    }

    #[test]
    fn missing_baseline_keeps_line() {
        let mut acc = TextAccumulator::default();
        acc.push("a", None);
        acc.push("b", Some(3.0));
        acc.push("c", None);
        assert_eq!(acc.take().as_deref(), Some("a b c"));
    }

    #[test]
    fn load_errors_classify_by_password_presence() {
        let e = classify_load_error(
            Path::new("x.pdf"),
            None,
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError),
        );
        assert!(matches!(e, ExtractionError::CorruptPdf { .. }));

        let e = classify_load_error(
            Path::new("x.pdf"),
            None,
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
        );
        assert!(matches!(e, ExtractionError::PasswordRequired { .. }));

        let e = classify_load_error(
            Path::new("x.pdf"),
            Some("guess"),
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
        );
        assert!(matches!(e, ExtractionError::WrongPassword { .. }));
    }
}
