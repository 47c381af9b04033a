//! Device bitmap format.
//!
//! The display takes a fixed-size 4-bit grayscale frame:
//!
//! ```text
//! "#file#000801314144imagebin"   26-byte ASCII header
//! packed pixels                  two pixels per byte, first pixel in the low nibble
//! ```
//!
//! With the `codec` feature (default) [`convert_image`] turns any common image
//! file into such a frame.

#[cfg(feature = "codec")]
use crate::error::{Error, Result};
#[cfg(feature = "codec")]
use log::debug;
#[cfg(feature = "codec")]
use std::path::Path;

/// Header that precedes every frame.
pub const HEADER: &[u8] = b"#file#000801314144imagebin";

/// Display width in pixels.
pub const DEFAULT_WIDTH: u32 = 1872;

/// Display height in pixels.
pub const DEFAULT_HEIGHT: u32 = 1404;

/// Pack 8-bit gray pixels into 4-bit pairs.
///
/// Only the high nibble of each pixel is kept. An odd trailing pixel is
/// paired with 0.
pub fn pack_gray4(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks(2)
        .map(|pair| {
            let low = pair[0] >> 4;
            let high = pair.get(1).map_or(0, |p| p >> 4);
            (high << 4) | low
        })
        .collect()
}

/// Header followed by the packed pixels.
pub fn encode_frame(pixels: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER.len() + pixels.len().div_ceil(2));
    frame.extend_from_slice(HEADER);
    frame.extend(pack_gray4(pixels));
    frame
}

/// ITU-R 601 luma, rounded the way common imaging libraries do it.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let value = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
    // 19595 + 38470 + 7471 == 65536, so the result fits a u8.
    (value >> 16) as u8
}

/// Decode `path` and convert it into a device frame of `width` x `height`.
///
/// Portrait images are turned a quarter counter-clockwise first. The image
/// is then scaled to cover the frame and center-cropped.
#[cfg(feature = "codec")]
pub fn convert_image(path: &Path, width: u32, height: u32) -> Result<Vec<u8>> {
    use image::imageops::FilterType;

    if !path.is_file() {
        return Err(Error::Image(format!("file '{}' not found", path.display())));
    }

    let mut img = image::open(path)
        .map_err(|e| Error::Image(format!("cannot decode '{}': {e}", path.display())))?;
    debug!(
        "Decoded {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );

    if img.height() > img.width() {
        img = img.rotate270();
    }
    if img.width() != width || img.height() != height {
        img = img.resize_to_fill(width, height, FilterType::Lanczos3);
    }

    let gray: Vec<u8> = img
        .to_rgb8()
        .pixels()
        .map(|p| luma(p[0], p[1], p[2]))
        .collect();

    let frame = encode_frame(&gray);
    debug!("Converted {} into {} bytes", path.display(), frame.len());
    Ok(frame)
}
