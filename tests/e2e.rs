//! End-to-end tests against real PDFs through pdfium.
//!
//! These need the pdfium shared library (and, for the llama-server test,
//! vision model files). They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! The llama-server test additionally needs:
//!   PDF2TXT_VISION_MODEL=/path/model.gguf PDF2TXT_CLIP_MODEL=/path/mmproj.gguf

use image::{DynamicImage, Rgb, RgbImage};
use pdf2txt::pipeline::extract::bind_pdfium;
use pdf2txt::{
    async_trait, convert_to_file, inspect, ConversionConfig, ExtractionError, InferenceError,
    Pdf2TxtError, VisionRuntime, FALLBACK_DESCRIPTION,
};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Write a two-page PDF: page 1 has a line of text followed by a picture,
/// page 2 has text only.
fn write_fixture(dir: &Path) -> PathBuf {
    let pdfium = bind_pdfium().expect("pdfium library available");
    let mut doc = pdfium.create_new_pdf().unwrap();
    let font = doc.fonts_mut().helvetica();

    let mut first = doc
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::a4())
        .unwrap();
    first
        .objects_mut()
        .create_text_object(
            PdfPoints::new(72.0),
            PdfPoints::new(760.0),
            "PAGE1TEXT",
            font,
            PdfPoints::new(12.0),
        )
        .unwrap();

    let figure = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    let jpeg = dir.join("figure.jpg");
    DynamicImage::ImageRgb8(figure)
        .save_with_format(&jpeg, image::ImageFormat::Jpeg)
        .unwrap();
    let mut picture = PdfPageImageObject::new_from_jpeg_file(&doc, &jpeg).unwrap();
    picture.scale(128.0, 96.0).unwrap();
    picture
        .translate(PdfPoints::new(72.0), PdfPoints::new(600.0))
        .unwrap();
    first.objects_mut().add_image_object(picture).unwrap();

    let mut second = doc
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::a4())
        .unwrap();
    second
        .objects_mut()
        .create_text_object(
            PdfPoints::new(72.0),
            PdfPoints::new(760.0),
            "PAGE2TEXT",
            font,
            PdfPoints::new(12.0),
        )
        .unwrap();

    let path = dir.join("fixture.pdf");
    doc.save_to_file(&path).unwrap();
    path
}

/// Always answers with the same description and counts calls.
#[derive(Default)]
struct FixedRuntime {
    calls: AtomicUsize,
}

#[async_trait]
impl VisionRuntime for FixedRuntime {
    async fn describe(&self, image: &Path, _prompt: &str) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let decoded = image::open(image).map_err(|e| InferenceError::ImageUnreadable {
            path: image.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(format!("a {}x{} gradient", decoded.width(), decoded.height()))
    }
}

// ── Inspect ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_fixture() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path());

    let meta = inspect(&pdf, None).await.expect("inspect() should succeed");

    assert_eq!(meta.page_count, 2);
    assert_eq!(meta.image_count, 1);
    assert!(!meta.pdf_version.is_empty());
    println!("Metadata: {:?}", meta);
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    e2e_skip_unless_enabled!();

    let err = inspect("/definitely/not/a/real/file.pdf", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Pdf2TxtError::Extraction(ExtractionError::FileNotFound { .. })
    ));
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_fixture_with_injected_runtime() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path());
    let temp_root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FixedRuntime::default());

    let config = ConversionConfig::builder()
        .vision_runtime(runtime.clone() as Arc<dyn VisionRuntime>)
        .temp_root(temp_root.path())
        .build()
        .unwrap();

    let output = convert_to_file(&pdf, &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(runtime.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.stats.total_pages, 2);
    assert_eq!(output.stats.images_described, 1);

    let text = std::fs::read_to_string(dir.path().join("fixture.txt")).unwrap();
    assert_eq!(text, output.text);

    let p1 = text.find("PAGE1TEXT").expect("page 1 text");
    let img = text.find("[image: a ").expect("image description");
    let p2 = text.find("PAGE2TEXT").expect("page 2 text");
    assert!(p1 < img && img < p2, "unexpected order:\n{text}");
    assert!(text.contains("===== Page 2 ====="));

    assert!(!output.temp_dir.exists());
    assert!(std::fs::read_dir(temp_root.path()).unwrap().next().is_none());
    println!("--- BEGIN OUTPUT ---\n{}--- END OUTPUT ---", text);
}

// ── Encrypted input ──────────────────────────────────────────────────────────

/// One page, text only, RC4-encrypted with user password "secret".
const ENCRYPTED_PDF: &[u8] = include_bytes!("../test_cases/encrypted.pdf");
const ENCRYPTED_PASSWORD: &str = "secret";

fn write_encrypted(dir: &Path) -> PathBuf {
    let path = dir.join("encrypted.pdf");
    std::fs::write(&path, ENCRYPTED_PDF).unwrap();
    path
}

#[tokio::test]
async fn test_encrypted_pdf_without_password() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_encrypted(dir.path());
    let destination = dir.path().join("encrypted.txt");
    std::fs::write(&destination, b"previous conversion\n").unwrap();
    let temp_root = tempfile::tempdir().unwrap();

    let config = ConversionConfig::builder()
        .temp_root(temp_root.path())
        .build()
        .unwrap();

    let err = convert_to_file(&pdf, &config).await.unwrap_err();

    assert!(
        matches!(
            err,
            Pdf2TxtError::Extraction(ExtractionError::PasswordRequired { .. })
        ),
        "got: {err}"
    );
    assert_eq!(std::fs::read(&destination).unwrap(), b"previous conversion\n");
    assert!(std::fs::read_dir(temp_root.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_encrypted_pdf_wrong_password() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_encrypted(dir.path());

    let err = inspect(&pdf, Some("not-the-password")).await.unwrap_err();

    assert!(
        matches!(
            err,
            Pdf2TxtError::Extraction(ExtractionError::WrongPassword { .. })
        ),
        "got: {err}"
    );
}

#[tokio::test]
async fn test_encrypted_pdf_with_password() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_encrypted(dir.path());

    // No images, so no vision model is needed.
    let config = ConversionConfig::builder()
        .password(ENCRYPTED_PASSWORD)
        .build()
        .unwrap();

    let output = convert_to_file(&pdf, &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(output.stats.total_pages, 1);
    assert!(output.text.contains("SECRETTEXT"), "got: {:?}", output.text);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("encrypted.txt")).unwrap(),
        output.text
    );
}

#[tokio::test]
async fn test_convert_with_llama_server() {
    e2e_skip_unless_enabled!();
    let (Ok(vision), Ok(clip)) = (
        std::env::var("PDF2TXT_VISION_MODEL"),
        std::env::var("PDF2TXT_CLIP_MODEL"),
    ) else {
        println!("SKIP: set PDF2TXT_VISION_MODEL and PDF2TXT_CLIP_MODEL");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path());

    let config = ConversionConfig::builder()
        .vision_model_path(vision)
        .clip_model_path(clip)
        .max_tokens(256)
        .build()
        .unwrap();

    let output = convert_to_file(&pdf, &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(output.images.len(), 1);
    let line = output
        .text
        .lines()
        .find(|l| l.starts_with("[image: ") || *l == FALLBACK_DESCRIPTION)
        .expect("image position rendered");
    println!("[llama-server] {line}");
    println!("[llama-server] {:?}", output.stats);
}
