//! Document model shared by the pipeline stages.
//!
//! Extraction produces [`PageContent`] (ordered [`ContentBlock`]s). The
//! materializer turns each page into a [`PageText`]: the same order, with every
//! image replaced by an [`ImageToken`] segment. Tokens never enter the text
//! itself, so substitution in the assembler is positional and cannot collide
//! with anything the PDF contains.

use image::DynamicImage;
use serde::{Serialize, Serializer};
use std::fmt;

/// One block of page content, in rendered order.
#[derive(Debug)]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
}

/// A run of text from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    /// 0-based page index.
    pub page_index: usize,
    pub text: String,
}

/// An embedded image and its position on the page.
#[derive(Debug)]
pub struct ImageBlock {
    /// 0-based page index.
    pub page_index: usize,
    /// Index of this block among all blocks of its page.
    pub sequence: usize,
    pub source: ImageSource,
}

impl ImageBlock {
    /// Token identifying this image for the whole run.
    pub fn token(&self) -> ImageToken {
        ImageToken::new(self.page_index + 1, self.sequence)
    }
}

/// Image payload as handed over by the parser.
pub enum ImageSource {
    /// Already decoded to pixels.
    Pixels(DynamicImage),
    /// Encoded bytes (PNG, JPEG, ...) still to be decoded.
    Encoded(Vec<u8>),
    /// The parser could not produce the image.
    Unreadable(String),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Pixels(img) => write!(f, "Pixels({}x{})", img.width(), img.height()),
            ImageSource::Encoded(bytes) => write!(f, "Encoded({} bytes)", bytes.len()),
            ImageSource::Unreadable(detail) => write!(f, "Unreadable({detail:?})"),
        }
    }
}

/// All blocks of one page.
#[derive(Debug)]
pub struct PageContent {
    /// 0-based page index.
    pub page_index: usize,
    pub blocks: Vec<ContentBlock>,
}

impl PageContent {
    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image(_)))
            .count()
    }
}

/// Placeholder for an image: `p{page}-b{sequence}`, page 1-indexed.
///
/// Unique within a run; the conversion rejects page content that repeats one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageToken {
    pub page: usize,
    pub sequence: usize,
}

impl ImageToken {
    pub fn new(page: usize, sequence: usize) -> Self {
        Self { page, sequence }
    }

    /// File name of the materialized image.
    pub fn file_name(&self) -> String {
        format!("{self}.png")
    }
}

impl fmt::Display for ImageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}-b{}", self.page, self.sequence)
    }
}

impl Serialize for ImageToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A piece of a page after materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Image(ImageToken),
}

/// One page as text and image positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 0-based page index.
    pub page_index: usize,
    pub segments: Vec<Segment>,
}

/// What ends up at an image's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Description {
    Generated(String),
    Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_format() {
        let t = ImageToken::new(3, 12);
        assert_eq!(t.to_string(), "p3-b12");
        assert_eq!(t.file_name(), "p3-b12.png");
    }

    #[test]
    fn image_block_token_is_one_indexed() {
        let block = ImageBlock {
            page_index: 0,
            sequence: 4,
            source: ImageSource::Unreadable("x".into()),
        };
        assert_eq!(block.token(), ImageToken::new(1, 4));
    }

    #[test]
    fn tokens_order_by_page_then_sequence() {
        let mut tokens = vec![
            ImageToken::new(2, 0),
            ImageToken::new(1, 5),
            ImageToken::new(1, 2),
        ];
        tokens.sort();
        assert_eq!(
            tokens,
            vec![ImageToken::new(1, 2), ImageToken::new(1, 5), ImageToken::new(2, 0)]
        );
    }

    #[test]
    fn token_serializes_as_string() {
        let json = serde_json::to_string(&ImageToken::new(7, 1)).unwrap();
        assert_eq!(json, "\"p7-b1\"");
    }
}
