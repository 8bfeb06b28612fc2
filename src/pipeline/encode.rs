//! Image encoding helpers: PNG bytes on disk, base64 data URIs on the wire.
//!
//! Every materialized image is stored as PNG regardless of how it was
//! embedded in the PDF. PNG is lossless, so labels and fine print in figures
//! reach the vision model exactly as the parser decoded them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ColorType, DynamicImage};
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG.
///
/// Float images have no PNG representation and are converted to 8-bit RGBA.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match img.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?,
        _ => img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?,
    }
    Ok(buf)
}

/// Wrap image bytes in a `data:` URI for an OpenAI-style `image_url` part.
pub fn data_uri(bytes: &[u8], mime_type: &str) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    format!("data:{};base64,{}", mime_type, b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, Rgba32FImage, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");
        let back = image::load_from_memory(&png).expect("valid png");
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn float_images_are_converted() {
        let img = DynamicImage::ImageRgba32F(Rgba32FImage::from_pixel(
            4,
            3,
            Rgba([0.5, 0.5, 0.5, 1.0]),
        ));
        let png = encode_png(&img).expect("encode should succeed");
        let back = image::load_from_memory(&png).expect("valid png");
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[test]
    fn data_uri_roundtrips() {
        let uri = data_uri(b"\x89PNG", "image/png");
        let b64 = uri.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(b64).unwrap(), b"\x89PNG");
    }
}
