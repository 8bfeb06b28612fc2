//! Input validation: make sure the path names a readable PDF.
//!
//! We check existence, read permission and the `%PDF` magic bytes before
//! handing the file to pdfium, so callers get a meaningful error rather than
//! a generic pdfium load failure.

use crate::error::ExtractionError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path and return it unchanged on success.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<PathBuf, ExtractionError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(ExtractionError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic != b"%PDF" => {
                    return Err(ExtractionError::NotAPdf { path, magic });
                }
                Ok(()) => {}
                // Shorter than four bytes: certainly not a PDF.
                Err(_) => return Err(ExtractionError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractionError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
