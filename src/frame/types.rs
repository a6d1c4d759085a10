use image::RgbImage;

use crate::error::{PipelineError, Result};

/// Pixel layout of a [`RawFrame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Full-resolution luma plane followed by a half-resolution chroma
    /// plane with interleaved V,U samples.
    Nv21,
}

/// One plane of a strided planar image, as handed out by a capture device.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte offset of sample (`col`, `row`) within this plane.
    pub fn offset(&self, col: usize, row: usize) -> usize {
        row * self.row_stride + col * self.pixel_stride
    }

    /// Whether a `cols` × `rows` sample grid fits inside the plane.
    pub(crate) fn covers(&self, cols: usize, rows: usize) -> bool {
        if cols == 0 || rows == 0 {
            return true;
        }
        self.pixel_stride > 0
            && self.row_stride >= (cols - 1) * self.pixel_stride + 1
            && self.offset(cols - 1, rows - 1) < self.data.len()
    }
}

/// A borrowed multi-plane 4:2:0 image (luma + two half-resolution chroma
/// planes), valid only while the capture buffer is alive.
#[derive(Debug, Clone, Copy)]
pub struct PlanarImage<'a> {
    pub width: u32,
    pub height: u32,
    pub y: Plane<'a>,
    pub u: Plane<'a>,
    pub v: Plane<'a>,
}

/// A packed capture frame.
///
/// Immutable once created; ownership moves from the capture source into the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    timestamp_us: u64,
}

impl RawFrame {
    /// Size in bytes of a packed NV21 buffer.
    pub fn nv21_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    /// Wrap an already-packed NV21 buffer.
    pub fn from_nv21(width: u32, height: u32, data: Vec<u8>, timestamp_us: u64) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(PipelineError::Encode(format!(
                "NV21 needs non-zero even dimensions, got {width}x{height}"
            )));
        }
        let expected = Self::nv21_len(width, height);
        if data.len() != expected {
            return Err(PipelineError::Encode(format!(
                "NV21 buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format: PixelFormat::Nv21,
            data,
            timestamp_us,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Capture timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Luma plane bytes.
    pub fn luma(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    /// Interleaved V,U chroma plane bytes.
    pub fn chroma(&self) -> &[u8] {
        &self.data[self.luma_len()..]
    }

    /// View the packed buffer as a strided planar image.
    ///
    /// Packing this view again yields an identical frame.
    pub fn planes(&self) -> PlanarImage<'_> {
        let width = self.width as usize;
        let chroma = self.chroma();
        PlanarImage {
            width: self.width,
            height: self.height,
            y: Plane::new(self.luma(), width, 1),
            u: Plane::new(&chroma[1..], width, 2),
            v: Plane::new(chroma, width, 2),
        }
    }
}

/// Compressed image bytes in a self-describing format (JPEG, PNG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode into an RGB image. Consumes the encoded bytes.
    pub fn decode(self) -> Result<RgbImage> {
        super::codec::decode_image(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv21_len_is_one_and_a_half_bytes_per_pixel() {
        assert_eq!(RawFrame::nv21_len(640, 480), 460_800);
        assert_eq!(RawFrame::nv21_len(2, 2), 6);
    }

    #[test]
    fn from_nv21_rejects_odd_dimensions() {
        let err = RawFrame::from_nv21(3, 2, vec![0; 9], 0).unwrap_err();
        assert!(matches!(err, PipelineError::Encode(_)));
    }

    #[test]
    fn from_nv21_rejects_wrong_buffer_length() {
        let err = RawFrame::from_nv21(4, 4, vec![0; 23], 0).unwrap_err();
        assert!(matches!(err, PipelineError::Encode(_)));
    }

    #[test]
    fn planes_view_splits_luma_and_interleaved_chroma() {
        // 4x2: 8 luma bytes, then V0 U0 V1 U1
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 20, 11, 21];
        let frame = RawFrame::from_nv21(4, 2, data, 42).unwrap();
        let planes = frame.planes();

        assert_eq!(planes.y.data.len(), 8);
        assert_eq!(planes.v.data[planes.v.offset(0, 0)], 10);
        assert_eq!(planes.u.data[planes.u.offset(0, 0)], 20);
        assert_eq!(planes.v.data[planes.v.offset(1, 0)], 11);
        assert_eq!(planes.u.data[planes.u.offset(1, 0)], 21);
        assert_eq!(frame.timestamp_us(), 42);
    }

    #[test]
    fn plane_covers_checks_last_sample() {
        let data = [0u8; 10];
        let plane = Plane::new(&data, 5, 2);
        assert!(plane.covers(3, 2)); // last offset = 5 + 4 = 9
        assert!(!plane.covers(3, 3));
        assert!(!Plane::new(&data, 5, 0).covers(1, 1));
    }

    #[test]
    fn encoded_image_garbage_fails_to_decode() {
        let err = EncodedImage::new(vec![0xDE, 0xAD, 0xBE, 0xEF]).decode().unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
