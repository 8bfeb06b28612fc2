//! Conversion entry points.
//!
//! A run walks the [`RunStage`] machine once:
//!
//! ```text
//! begin ─▶ extract+materialize ─▶ describe ─▶ assemble ─▶ (write) ─▶ finish
//! ```
//!
//! [`Run`] owns the run's temporary image directory. It is a
//! [`tempfile::TempDir`], so it is removed when the run is finished, when a
//! stage returns an error, and even on unwinding. The vision runtime is only
//! acquired when at least one image was materialized, and is released before
//! assembly starts.

use crate::config::ConversionConfig;
use crate::document::{ContentBlock, ImageToken, PageContent, PageText};
use crate::error::{ExtractionError, ImageDecodeError, Pdf2TxtError};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, ImageResult};
use crate::pipeline::assemble::{assemble, DescriptionTable};
use crate::pipeline::describe::{describe_images, DescribedImage, RuntimeGuard};
use crate::pipeline::extract::{self, PdfExtractor};
use crate::pipeline::materialize::{ImageMaterializer, MaterializedImage};
use crate::pipeline::{input, write};
use crate::stage::{RunStage, StageTracker};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Convert a PDF to text without writing anything but temporary images.
///
/// # Errors
/// Returns `Err(Pdf2TxtError)` only for fatal errors: unreadable or encrypted
/// PDF, vision runtime failing to start. Per-image failures are recorded in
/// [`ConversionOutput::images`].
pub async fn convert(
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2TxtError> {
    let mut run = Run::begin(config)?;
    let outcome = async {
        let pdf = input::resolve_local(pdf_path.as_ref())?;
        let extracted = run.extract_pdf(&pdf).await?;
        run.complete(extracted).await
    }
    .await;
    run.finish(outcome)
}

/// Convert a PDF and write the text to `config.output_path`, or next to the
/// PDF as `<stem>.txt`.
///
/// An existing output file is replaced only once the new text has been
/// written completely.
pub async fn convert_to_file(
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2TxtError> {
    let pdf_path = pdf_path.as_ref();
    let destination = config
        .output_path
        .clone()
        .unwrap_or_else(|| write::output_path_for(pdf_path));

    let mut run = Run::begin(config)?;
    let outcome = async {
        let pdf = input::resolve_local(pdf_path)?;
        let extracted = run.extract_pdf(&pdf).await?;
        let output = run.complete(extracted).await?;
        run.write(output, &destination).await
    }
    .await;
    run.finish(outcome)
}

/// Run the pipeline over pages produced by another parser.
///
/// Pages are consumed lazily; an `Err` item aborts the run.
pub async fn convert_pages<I>(
    pages: I,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2TxtError>
where
    I: IntoIterator<Item = Result<PageContent, ExtractionError>>,
{
    let mut run = Run::begin(config)?;
    let outcome = async {
        let extracted = run.extract_pages(pages)?;
        run.complete(extracted).await
    }
    .await;
    run.finish(outcome)
}

/// [`convert_pages`], then write the text to `destination`.
pub async fn convert_pages_to_file<I>(
    pages: I,
    destination: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2TxtError>
where
    I: IntoIterator<Item = Result<PageContent, ExtractionError>>,
{
    let mut run = Run::begin(config)?;
    let outcome = async {
        let extracted = run.extract_pages(pages)?;
        let output = run.complete(extracted).await?;
        run.write(output, destination.as_ref()).await
    }
    .await;
    run.finish(outcome)
}

/// Synchronous wrapper around [`convert_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2TxtError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TxtError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_to_file(pdf_path, config))
}

/// Read PDF metadata without converting content.
///
/// Does not need the vision models.
pub async fn inspect(
    pdf_path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2TxtError> {
    let pdf = input::resolve_local(pdf_path.as_ref())?;
    extract::extract_metadata(&pdf, password).await
}

// ── Run ──────────────────────────────────────────────────────────────────

/// Extraction and materialization results for the whole document.
#[derive(Debug, Default)]
struct Extracted {
    pages: Vec<PageText>,
    images: Vec<MaterializedImage>,
    skipped: Vec<(ImageToken, ImageDecodeError)>,
    images_found: usize,
}

/// Pull pages one at a time and materialize each page's images before the
/// next page is read.
///
/// Every image token must be unique for the run: a repeated token would
/// share a file and a description with another image.
fn materialize_all<I>(pages: I, materializer: &ImageMaterializer) -> Result<Extracted, ExtractionError>
where
    I: IntoIterator<Item = Result<PageContent, ExtractionError>>,
{
    let mut out = Extracted::default();
    let mut seen = HashSet::new();
    for page in pages {
        let page = page?;
        check_image_tokens(&page, &mut seen)?;
        out.images_found += page.image_count();
        let materialized = materializer.materialize_page(page);
        out.pages.push(materialized.text);
        out.images.extend(materialized.images);
        out.skipped.extend(materialized.skipped);
    }
    Ok(out)
}

fn check_image_tokens(
    page: &PageContent,
    seen: &mut HashSet<ImageToken>,
) -> Result<(), ExtractionError> {
    for block in &page.blocks {
        let ContentBlock::Image(image) = block else {
            continue;
        };
        if image.page_index != page.page_index {
            return Err(ExtractionError::InvalidContent {
                page: page.page_index + 1,
                detail: format!(
                    "image block {} belongs to page {}",
                    image.sequence,
                    image.page_index + 1
                ),
            });
        }
        let token = image.token();
        if !seen.insert(token) {
            return Err(ExtractionError::InvalidContent {
                page: page.page_index + 1,
                detail: format!("duplicate image position {token}"),
            });
        }
    }
    Ok(())
}

struct Run<'a> {
    config: &'a ConversionConfig,
    stages: StageTracker,
    temp_dir: TempDir,
    started: Instant,
    stats: ConversionStats,
}

impl<'a> Run<'a> {
    fn begin(config: &'a ConversionConfig) -> Result<Self, Pdf2TxtError> {
        let temp_dir = match config.temp_root {
            Some(ref root) => tempfile::Builder::new().prefix("pdf2txt-").tempdir_in(root),
            None => tempfile::Builder::new().prefix("pdf2txt-").tempdir(),
        }
        .map_err(Pdf2TxtError::TempDir)?;
        debug!("Temporary image directory: {}", temp_dir.path().display());

        Ok(Self {
            config,
            stages: StageTracker::new(),
            temp_dir,
            started: Instant::now(),
            stats: ConversionStats::default(),
        })
    }

    fn materializer(&self) -> ImageMaterializer {
        ImageMaterializer::new(self.temp_dir.path())
    }

    async fn extract_pdf(&mut self, pdf: &Path) -> Result<Extracted, Pdf2TxtError> {
        self.stages.advance(RunStage::Extracting);
        info!("Starting conversion: {}", pdf.display());
        let start = Instant::now();

        let path = pdf.to_path_buf();
        let password = self.config.password.clone();
        let materializer = self.materializer();

        // pdfium is blocking and not async-safe.
        let extracted = tokio::task::spawn_blocking(move || -> Result<Extracted, ExtractionError> {
            let extractor = PdfExtractor::new()?;
            let document = extractor.open(&path, password.as_deref())?;
            materialize_all(document.pages(), &materializer)
        })
        .await
        .map_err(|e| Pdf2TxtError::Internal(format!("Extraction task panicked: {}", e)))??;

        self.stats.extract_duration_ms = start.elapsed().as_millis() as u64;
        Ok(extracted)
    }

    fn extract_pages<I>(&mut self, pages: I) -> Result<Extracted, Pdf2TxtError>
    where
        I: IntoIterator<Item = Result<PageContent, ExtractionError>>,
    {
        self.stages.advance(RunStage::Extracting);
        let start = Instant::now();
        let extracted = materialize_all(pages, &self.materializer())?;
        self.stats.extract_duration_ms = start.elapsed().as_millis() as u64;
        Ok(extracted)
    }

    /// Describe, then assemble.
    async fn complete(&mut self, extracted: Extracted) -> Result<ConversionOutput, Pdf2TxtError> {
        self.stages.advance(RunStage::MaterializingImages);
        info!(
            "Extracted {} pages: {} images found, {} materialized, {} skipped",
            extracted.pages.len(),
            extracted.images_found,
            extracted.images.len(),
            extracted.skipped.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_complete(extracted.pages.len(), extracted.images.len());
        }

        self.stages.advance(RunStage::Describing);
        let describe_start = Instant::now();
        let described = if extracted.images.is_empty() {
            debug!("No images to describe; vision runtime not loaded");
            Vec::new()
        } else {
            let guard =
                RuntimeGuard::acquire(self.config.vision_runtime.as_ref(), &self.config.runtime)
                    .await?;
            let results = describe_images(
                guard.runtime(),
                &extracted.images,
                self.config.prompt(),
                self.config.progress_callback.as_ref(),
            )
            .await;
            guard.release().await;
            results
        };
        self.stats.describe_duration_ms = describe_start.elapsed().as_millis() as u64;

        self.stages.advance(RunStage::Assembling);
        let table: DescriptionTable = described
            .iter()
            .map(|d| (d.token, d.description.clone()))
            .collect();
        let text = assemble(&extracted.pages, &table, &self.config.page_separator);

        let described_count = described.iter().filter(|d| d.error.is_none()).count();
        self.stats.total_pages = extracted.pages.len();
        self.stats.images_found = extracted.images_found;
        self.stats.images_materialized = extracted.images.len();
        self.stats.images_described = described_count;
        self.stats.images_fallback = described.len() - described_count;
        self.stats.images_skipped = extracted.skipped.len();

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(described.len(), described_count);
        }

        Ok(ConversionOutput {
            text,
            images: image_results(described, extracted.skipped),
            stats: self.stats.clone(),
            temp_dir: self.temp_dir.path().to_path_buf(),
            output_path: None,
        })
    }

    async fn write(
        &mut self,
        mut output: ConversionOutput,
        destination: &Path,
    ) -> Result<ConversionOutput, Pdf2TxtError> {
        self.stages.advance(RunStage::Writing);
        write::write_output(&output.text, destination).await?;
        output.output_path = Some(destination.to_path_buf());
        Ok(output)
    }

    /// Enter `Done` or `Failed` and remove the temporary directory.
    fn finish(
        self,
        outcome: Result<ConversionOutput, Pdf2TxtError>,
    ) -> Result<ConversionOutput, Pdf2TxtError> {
        let Run {
            mut stages,
            temp_dir,
            started,
            ..
        } = self;

        let outcome = match outcome {
            Ok(mut output) => {
                stages.advance(RunStage::Done);
                output.stats.total_duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Conversion complete: {} pages, {}/{} images described, {}ms total",
                    output.stats.total_pages,
                    output.stats.images_described,
                    output.stats.images_found,
                    output.stats.total_duration_ms
                );
                Ok(output)
            }
            Err(e) => {
                stages.fail(&e);
                Err(e)
            }
        };

        remove_temp_dir(temp_dir);
        outcome
    }
}

fn remove_temp_dir(temp_dir: TempDir) {
    let path: PathBuf = temp_dir.path().to_path_buf();
    match temp_dir.close() {
        Ok(()) => debug!("Removed temporary directory {}", path.display()),
        Err(e) => warn!(
            "Failed to remove temporary directory {}: {}",
            path.display(),
            e
        ),
    }
}

/// One record per image block, in document order.
fn image_results(
    described: Vec<DescribedImage>,
    skipped: Vec<(ImageToken, ImageDecodeError)>,
) -> Vec<ImageResult> {
    let mut by_token: BTreeMap<ImageToken, ImageResult> = BTreeMap::new();

    for d in described {
        by_token.insert(
            d.token,
            ImageResult {
                token: d.token,
                page_num: d.token.page,
                description: Some(d.description),
                decode_error: None,
                inference_error: d.error,
                duration_ms: d.duration_ms,
            },
        );
    }
    for (token, e) in skipped {
        by_token.insert(
            token,
            ImageResult {
                token,
                page_num: token.page,
                description: None,
                decode_error: Some(e),
                inference_error: None,
                duration_ms: 0,
            },
        );
    }

    by_token.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Description, Segment};
    use crate::error::InferenceError;

    #[test]
    fn image_results_merge_in_document_order() {
        let described = vec![
            DescribedImage {
                token: ImageToken::new(2, 0),
                description: Description::Fallback,
                error: Some(InferenceError::EmptyResponse),
                duration_ms: 5,
            },
            DescribedImage {
                token: ImageToken::new(1, 3),
                description: Description::Generated("x".into()),
                error: None,
                duration_ms: 7,
            },
        ];
        let skipped = vec![(
            ImageToken::new(1, 5),
            ImageDecodeError::Decode {
                page: 1,
                sequence: 5,
                detail: "bad".into(),
            },
        )];

        let results = image_results(described, skipped);
        let tokens: Vec<String> = results.iter().map(|r| r.token.to_string()).collect();
        assert_eq!(tokens, vec!["p1-b3", "p1-b5", "p2-b0"]);
        assert!(results[1].is_skipped());
        assert!(results[2].is_fallback());
    }

    #[test]
    fn materialize_all_stops_at_first_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let m = ImageMaterializer::new(dir.path());
        let pages = vec![
            Ok(PageContent {
                page_index: 0,
                blocks: vec![],
            }),
            Err(ExtractionError::PageFailed {
                path: PathBuf::from("x.pdf"),
                page: 2,
                detail: "broken content stream".into(),
            }),
        ];
        let err = materialize_all(pages, &m).unwrap_err();
        assert!(matches!(err, ExtractionError::PageFailed { page: 2, .. }));
    }

    #[test]
    fn materialize_all_collects_pages() {
        let dir = tempfile::tempdir().unwrap();
        let m = ImageMaterializer::new(dir.path());
        let pages = (0..3).map(|i| {
            Ok(PageContent {
                page_index: i,
                blocks: vec![crate::document::ContentBlock::Text(
                    crate::document::TextBlock {
                        page_index: i,
                        text: format!("page {i}"),
                    },
                )],
            })
        });
        let out = materialize_all(pages, &m).unwrap();
        assert_eq!(out.pages.len(), 3);
        assert_eq!(out.pages[2].segments, vec![Segment::Text("page 2".into())]);
        assert_eq!(out.images_found, 0);
    }

    fn grey_image(page_index: usize, sequence: usize, level: u8) -> ContentBlock {
        ContentBlock::Image(crate::document::ImageBlock {
            page_index,
            sequence,
            source: crate::document::ImageSource::Pixels(image::DynamicImage::ImageLuma8(
                image::GrayImage::from_pixel(4, 4, image::Luma([level])),
            )),
        })
    }

    #[test]
    fn image_on_wrong_page_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = ImageMaterializer::new(dir.path());
        let pages = vec![
            Ok(PageContent {
                page_index: 0,
                blocks: vec![grey_image(0, 1, 10)],
            }),
            Ok(PageContent {
                page_index: 1,
                blocks: vec![grey_image(0, 1, 200)],
            }),
        ];

        let err = materialize_all(pages, &m).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidContent { page: 2, .. }));
        // page 1's image was not overwritten
        let written = image::open(dir.path().join("p1-b1.png")).unwrap().to_luma8();
        assert_eq!(written.get_pixel(0, 0).0, [10]);
    }

    #[test]
    fn duplicate_image_position_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = ImageMaterializer::new(dir.path());
        let pages = vec![
            Ok(PageContent {
                page_index: 0,
                blocks: vec![grey_image(0, 1, 10)],
            }),
            Ok(PageContent {
                page_index: 0,
                blocks: vec![grey_image(0, 1, 200)],
            }),
        ];

        let err = materialize_all(pages, &m).unwrap_err();
        match err {
            ExtractionError::InvalidContent { page, detail } => {
                assert_eq!(page, 1);
                assert!(detail.contains("p1-b1"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
