//! Image materialization: image blocks → PNG files + position tokens.
//!
//! Each image block is decoded and written as `<token>.png` inside the run's
//! temporary directory. In the page's segment list the block's position is
//! taken by a [`Segment::Image`] carrying the token. A block that cannot be
//! decoded or written is dropped from the page and reported; it never aborts
//! the run.

use crate::document::{
    ContentBlock, ImageBlock, ImageSource, ImageToken, PageContent, PageText, Segment,
};
use crate::error::ImageDecodeError;
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use std::path::PathBuf;
use tracing::{debug, warn};

/// An image written to the temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    pub token: ImageToken,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A page after materialization.
#[derive(Debug)]
pub struct MaterializedPage {
    pub text: PageText,
    pub images: Vec<MaterializedImage>,
    pub skipped: Vec<(ImageToken, ImageDecodeError)>,
}

/// Writes image blocks into one directory.
#[derive(Debug, Clone)]
pub struct ImageMaterializer {
    dir: PathBuf,
}

impl ImageMaterializer {
    /// `dir` must exist; it is normally the run's `TempDir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Decode one block and write it as PNG.
    pub fn materialize(&self, block: &ImageBlock) -> Result<MaterializedImage, ImageDecodeError> {
        let token = block.token();
        let decode_err = |detail: String| ImageDecodeError::Decode {
            page: token.page,
            sequence: token.sequence,
            detail,
        };

        let decoded;
        let img: &DynamicImage = match &block.source {
            ImageSource::Pixels(img) => img,
            ImageSource::Encoded(bytes) => {
                decoded = image::load_from_memory(bytes).map_err(|e| decode_err(e.to_string()))?;
                &decoded
            }
            ImageSource::Unreadable(detail) => return Err(decode_err(detail.clone())),
        };

        if img.width() == 0 || img.height() == 0 {
            return Err(decode_err("image has zero width or height".into()));
        }

        let path = self.dir.join(token.file_name());
        let write_err = |detail: String| ImageDecodeError::Write {
            page: token.page,
            sequence: token.sequence,
            path: path.clone(),
            detail,
        };

        let png = encode_png(img).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&path, png).map_err(|e| write_err(e.to_string()))?;

        debug!(
            "Materialized {} ({}x{}) → {}",
            token,
            img.width(),
            img.height(),
            path.display()
        );

        Ok(MaterializedImage {
            token,
            path,
            width: img.width(),
            height: img.height(),
        })
    }

    /// Materialize every image of a page, keeping block order.
    pub fn materialize_page(&self, page: PageContent) -> MaterializedPage {
        let mut segments = Vec::with_capacity(page.blocks.len());
        let mut images = Vec::new();
        let mut skipped = Vec::new();

        for block in page.blocks {
            match block {
                ContentBlock::Text(t) => segments.push(Segment::Text(t.text)),
                ContentBlock::Image(img) => match self.materialize(&img) {
                    Ok(m) => {
                        segments.push(Segment::Image(m.token));
                        images.push(m);
                    }
                    Err(e) => {
                        warn!("Skipping image {}: {}", img.token(), e);
                        skipped.push((img.token(), e));
                    }
                },
            }
        }

        MaterializedPage {
            text: PageText {
                page_index: page.page_index,
                segments,
            },
            images,
            skipped,
        }
    }
}
