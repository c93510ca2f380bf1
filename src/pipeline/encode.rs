//! Image encoding: `DynamicImage` → PNG bytes for the engine's stdin.
//!
//! PNG is lossless; JPEG artefacts around glyph edges cost recognition
//! accuracy, especially on binarised pages where every edge is a hard step.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page as PNG.
///
/// 16-bit and float buffers are narrowed to 8 bits first; the engine only
/// reads 8-bit input.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        other => {
            DynamicImage::ImageRgb8(other.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
    }
    debug!("Encoded page → {} bytes PNG", buf.len());
    Ok(buf)
}
