//! Output: write the assembled text next to the source PDF.
//!
//! The write is atomic: content goes to a uniquely named temporary file in
//! the destination's directory and is renamed over the destination only once
//! fully written. Concurrent runs each stage their own file, so the last
//! rename wins and neither run sees a write error. A failed write drops the
//! temporary file; an existing output file stays untouched.

use crate::error::WriteError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `<dir>/<stem>.txt` for `<dir>/<stem>.pdf`.
pub fn output_path_for(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("txt")
}

/// Write `text` as UTF-8 to `destination`, replacing any existing file.
pub async fn write_output(text: &str, destination: &Path) -> Result<(), WriteError> {
    let dest = destination.to_path_buf();
    let bytes = text.as_bytes().to_vec();

    tokio::task::spawn_blocking(move || stage_and_persist(&bytes, &dest))
        .await
        .map_err(|e| WriteError {
            path: destination.to_path_buf(),
            source: std::io::Error::other(format!("write task panicked: {e}")),
        })??;

    info!("Output written: {}", destination.display());
    Ok(())
}

fn stage_and_persist(bytes: &[u8], destination: &Path) -> Result<(), WriteError> {
    let fail = |source: std::io::Error| WriteError {
        path: destination.to_path_buf(),
        source,
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix(".pdf2txt-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    debug!("Wrote {} bytes to {}", bytes.len(), tmp.path().display());

    tmp.persist(destination).map_err(|e| fail(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sits_next_to_pdf() {
        assert_eq!(
            output_path_for(Path::new("/data/papers/attention.pdf")),
            PathBuf::from("/data/papers/attention.txt")
        );
        assert_eq!(
            output_path_for(Path::new("report.v2.pdf")),
            PathBuf::from("report.v2.txt")
        );
        assert_eq!(output_path_for(Path::new("noext")), PathBuf::from("noext.txt"));
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.txt");
        std::fs::write(&out, "old content that is longer").unwrap();

        write_output("new ✓", &out).await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "new ✓");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "staging file left behind");
    }

    #[tokio::test]
    async fn relative_destination_in_working_directory() {
        let name = format!("pdf2txt-write-test-{}.txt", std::process::id());
        let out = Path::new(&name);

        write_output("relative", out).await.unwrap();

        assert_eq!(std::fs::read_to_string(out).unwrap(), "relative");
        std::fs::remove_file(out).unwrap();
    }

    #[tokio::test]
    async fn concurrent_writes_to_one_destination_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("doc.txt");
        let first = "a".repeat(2 * 1024 * 1024);
        let second = "b".repeat(2 * 1024 * 1024);

        for _ in 0..10 {
            let (r1, r2) = tokio::join!(
                tokio::spawn({
                    let out = out.clone();
                    let text = first.clone();
                    async move { write_output(&text, &out).await }
                }),
                tokio::spawn({
                    let out = out.clone();
                    let text = second.clone();
                    async move { write_output(&text, &out).await }
                }),
            );
            r1.unwrap().unwrap();
            r2.unwrap().unwrap();

            let written = std::fs::read_to_string(&out).unwrap();
            assert!(written == first || written == second, "torn output");
        }

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "staging files left behind");
    }

    #[tokio::test]
    async fn unwritable_destination_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing-subdir").join("doc.txt");

        let err = write_output("text", &out).await.unwrap_err();
        assert_eq!(err.path, out);
        assert!(!out.exists());
    }
}
