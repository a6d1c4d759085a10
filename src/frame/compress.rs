use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::types::EncodedImage;
use crate::error::{PipelineError, Result};

/// Compress an RGB image to JPEG at the given quality (1-100).
pub fn compress_jpeg(image: &RgbImage, quality: u8) -> Result<EncodedImage> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| PipelineError::Encode(format!("JPEG encoding failed: {e}")))?;
    Ok(EncodedImage::new(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Create a synthetic RGB test image (gradient pattern).
    fn make_test_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    #[test]
    fn compress_jpeg_produces_valid_jpeg_bytes() {
        let jpeg = compress_jpeg(&make_test_rgb(640, 480), 85).unwrap();
        // JPEG files start with FF D8
        assert_eq!(jpeg.as_bytes()[0], 0xFF);
        assert_eq!(jpeg.as_bytes()[1], 0xD8);
    }

    #[test]
    fn compress_jpeg_lower_quality_produces_smaller_output() {
        let rgb = make_test_rgb(640, 480);
        let high = compress_jpeg(&rgb, 85).unwrap();
        let low = compress_jpeg(&rgb, 50).unwrap();
        assert!(
            low.len() < high.len(),
            "quality 50 ({}) should be smaller than quality 85 ({})",
            low.len(),
            high.len()
        );
    }

    #[test]
    fn compressed_frame_decodes_to_original_dimensions() {
        let jpeg = compress_jpeg(&make_test_rgb(320, 240), 90).unwrap();
        let decoded = jpeg.decode().unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
    }

    #[test]
    fn out_of_range_quality_is_clamped() {
        let jpeg = compress_jpeg(&make_test_rgb(16, 16), 0).unwrap();
        assert!(!jpeg.is_empty());
    }
}
