//! The resize-and-pad thumbnail codec.
//!
//! Decoding runs on untrusted bytes; callers are expected to invoke this
//! through the process sandbox rather than in-process.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage, imageops};

use crate::error::{NewsError, Result};

/// Fixed thumbnail canvas.
pub const THUMBNAIL_WIDTH: u32 = 1168;
pub const THUMBNAIL_HEIGHT: u32 = 657;
/// Fixed byte budget of the padded artifact.
pub const THUMBNAIL_OUT_SIZE: usize = 250_000;

/// Qualities tried in order until the JPEG fits the byte budget.
const JPEG_QUALITIES: &[u8] = &[82, 72, 62, 52, 42];

/// Decode an image, resize it to fit `width`x`height`, center it on a black
/// canvas of exactly those dimensions, and JPEG-encode the result into a
/// buffer zero-padded to exactly `out_size` bytes.
///
/// Every artifact therefore has the same dimensions and the same byte
/// length regardless of the source image.
pub fn resize_and_pad(input: &[u8], width: u32, height: u32, out_size: usize) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(input)?;
    let resized = decoded.resize(width, height, imageops::FilterType::Lanczos3);

    let mut canvas = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let x = i64::from((width - resized.width()) / 2);
    let y = i64::from((height - resized.height()) / 2);
    imageops::overlay(&mut canvas, &resized, x, y);

    for &quality in JPEG_QUALITIES {
        let mut encoded = Vec::new();
        canvas.write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, quality))?;
        if encoded.len() <= out_size {
            encoded.resize(out_size, 0);
            return Ok(encoded);
        }
    }
    Err(NewsError::ThumbnailBudget {
        max_bytes: out_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 40, 40]),
        ));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn output_is_exactly_out_size_and_canvas_sized() {
        let input = png_bytes(640, 480);
        let padded = resize_and_pad(&input, 320, 180, 60_000).unwrap();
        assert_eq!(padded.len(), 60_000);

        // The JPEG payload sits at the front of the zero padding.
        let decoded = image::load_from_memory(&padded).unwrap();
        assert_eq!(decoded.dimensions(), (320, 180));
    }

    #[test]
    fn tall_images_are_letterboxed_not_cropped() {
        let input = png_bytes(100, 400);
        let padded = resize_and_pad(&input, 320, 180, 60_000).unwrap();
        let decoded = image::load_from_memory(&padded).unwrap();
        assert_eq!(decoded.dimensions(), (320, 180));
        // Left edge is canvas padding.
        let corner = decoded.get_pixel(0, 90);
        assert!(corner.0[0] < 30 && corner.0[1] < 30 && corner.0[2] < 30);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(resize_and_pad(b"definitely not an image", 320, 180, 60_000).is_err());
    }
}
