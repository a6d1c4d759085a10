//! Digital zoom: crop about the image centre, then rescale back to the
//! original size.
//!
//! Uses `fast_image_resize` for SIMD-accelerated bilinear resampling. A zoom
//! factor within 1% of 1.0 is treated as no zoom and costs nothing.

use std::borrow::Cow;

use fast_image_resize as fr;
use fr::images::{Image, ImageRef};
use fr::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;

use super::types::RawFrame;
use crate::error::{PipelineError, Result};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 3.0;

/// Factors at or below `MIN_ZOOM + ZOOM_EPSILON` skip the transform.
const ZOOM_EPSILON: f32 = 0.01;

/// Clamp a requested zoom factor into `[MIN_ZOOM, MAX_ZOOM]`.
pub fn clamp_zoom(factor: f32) -> f32 {
    if factor.is_nan() {
        return MIN_ZOOM;
    }
    factor.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Whether `factor` is close enough to 1.0 that zooming would be wasted work.
pub fn is_identity(factor: f32) -> bool {
    clamp_zoom(factor) <= MIN_ZOOM + ZOOM_EPSILON
}

/// Centred crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    /// Compute the centred window for `factor`, aligning every edge to
    /// multiples of `align` (use 2 for 4:2:0 frames).
    pub fn centred(width: u32, height: u32, factor: f32, align: u32) -> Self {
        let factor = clamp_zoom(factor);
        let align = align.max(1);
        let fit = |full: u32| -> (u32, u32) {
            let size = ((full as f32 / factor) as u32 / align * align).clamp(align.min(full), full);
            let offset = (full - size) / 2 / align * align;
            (offset, size)
        };
        let (x, crop_w) = fit(width);
        let (y, crop_h) = fit(height);
        Self {
            x,
            y,
            width: crop_w,
            height: crop_h,
        }
    }

    fn scaled(self, divisor: u32) -> Self {
        Self {
            x: self.x / divisor,
            y: self.y / divisor,
            width: self.width / divisor,
            height: self.height / divisor,
        }
    }
}

/// Zoom an RGB image. Returns the input untouched for identity factors.
pub fn zoom_rgb(image: &RgbImage, factor: f32) -> Result<Cow<'_, RgbImage>> {
    if is_identity(factor) {
        return Ok(Cow::Borrowed(image));
    }
    let (width, height) = image.dimensions();
    let window = CropWindow::centred(width, height, factor, 1);
    let pixels = crop_scale(image.as_raw(), width, height, PixelType::U8x3, window)?;
    RgbImage::from_raw(width, height, pixels)
        .map(Cow::Owned)
        .ok_or_else(|| PipelineError::Encode("zoomed buffer has wrong size".to_string()))
}

/// Zoom a packed NV21 frame plane by plane.
///
/// Luma is resampled as single-channel pixels and the interleaved V,U plane
/// as two-channel pixels at half resolution, so chroma pairs never mix.
pub fn zoom_nv21(frame: RawFrame, factor: f32) -> Result<RawFrame> {
    if is_identity(factor) {
        return Ok(frame);
    }
    let (width, height) = (frame.width(), frame.height());
    let window = CropWindow::centred(width, height, factor, 2);

    let mut data = crop_scale(frame.luma(), width, height, PixelType::U8, window)?;
    let chroma = crop_scale(
        frame.chroma(),
        width / 2,
        height / 2,
        PixelType::U8x2,
        window.scaled(2),
    )?;
    data.extend_from_slice(&chroma);

    RawFrame::from_nv21(width, height, data, frame.timestamp_us())
}

fn crop_scale(
    src: &[u8],
    width: u32,
    height: u32,
    pixel_type: PixelType,
    window: CropWindow,
) -> Result<Vec<u8>> {
    let src_image = ImageRef::new(width, height, src, pixel_type)
        .map_err(|e| PipelineError::Encode(format!("zoom source: {e}")))?;
    let mut dst_image = Image::new(width, height, pixel_type);

    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Bilinear))
        .crop(
            f64::from(window.x),
            f64::from(window.y),
            f64::from(window.width),
            f64::from(window.height),
        );

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| PipelineError::Encode(format!("zoom resize failed: {e}")))?;

    Ok(dst_image.into_vec())
}
