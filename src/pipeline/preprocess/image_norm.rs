//! Single-image input normalization.
//!
//! Phone photos arrive rotated (EXIF tag 0x0112) and often far larger than
//! any vision model needs. This module corrects orientation, applies a
//! downscale guard, and re-encodes to PNG so the rest of the pipeline only
//! ever sees upright, bounded PNG pages.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use tracing::debug;

use super::PreprocessError;

/// Maximum dimension (width or height) after normalization.
const MAX_DIMENSION_PX: u32 = 4096;

/// Decode, orient, bound, and re-encode a single image input as PNG.
///
/// Returns the PNG bytes plus final pixel dimensions.
pub fn normalize_image(raw_bytes: &[u8]) -> Result<(Vec<u8>, u32, u32), PreprocessError> {
    let decoded = image::load_from_memory(raw_bytes)
        .map_err(|e| PreprocessError::CorruptDocument(format!("image decode failed: {e}")))?;

    let orientation = read_exif_orientation(raw_bytes);
    let oriented = apply_orientation(decoded, orientation);

    let bounded = downscale_guard(oriented, MAX_DIMENSION_PX);
    let (width, height) = (bounded.width(), bounded.height());

    let mut cursor = Cursor::new(Vec::new());
    bounded
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| PreprocessError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    let png_bytes = cursor.into_inner();

    debug!(
        orientation,
        width,
        height,
        png_size = png_bytes.len(),
        "Normalized single-image input"
    );

    Ok((png_bytes, width, height))
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Downscale to fit within `max_dim` on the longest side, preserving aspect.
fn downscale_guard(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w <= max_dim && h <= max_dim {
        return img;
    }
    img.resize(max_dim, max_dim, image::imageops::FilterType::CatmullRom)
}
