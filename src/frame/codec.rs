//! Planar frame packing and image decoding.
//!
//! `pack_nv21` turns a strided capture image into the contiguous NV21
//! layout carried on the wire: `width * height` luma bytes copied row by row
//! (ignoring row padding), then one V,U byte pair per 2x2 pixel block in
//! row-major order over the half-resolution chroma grid.

use image::{Rgb, RgbImage};

use super::types::{PlanarImage, RawFrame};
use crate::error::{PipelineError, Result};

/// Pack a strided planar image into an NV21 [`RawFrame`].
pub fn pack_nv21(image: &PlanarImage<'_>, timestamp_us: u64) -> Result<RawFrame> {
    let (width, height) = (image.width, image.height);
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(PipelineError::Encode(format!(
            "planar image needs non-zero even dimensions, got {width}x{height}"
        )));
    }

    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w / 2, h / 2);

    if image.y.row_stride < w || !image.y.covers(w, h) {
        return Err(PipelineError::Encode(format!(
            "luma plane too small for {width}x{height} (stride {}, {} bytes)",
            image.y.row_stride,
            image.y.data.len()
        )));
    }
    for (name, plane) in [("V", &image.v), ("U", &image.u)] {
        if !plane.covers(cw, ch) {
            return Err(PipelineError::Encode(format!(
                "{name} plane too small for {cw}x{ch} samples (row stride {}, pixel stride {}, {} bytes)",
                plane.row_stride,
                plane.pixel_stride,
                plane.data.len()
            )));
        }
    }

    let mut data = Vec::with_capacity(RawFrame::nv21_len(width, height));

    for row in 0..h {
        let start = row * image.y.row_stride;
        data.extend_from_slice(&image.y.data[start..start + w]);
    }

    for row in 0..ch {
        for col in 0..cw {
            data.push(image.v.data[image.v.offset(col, row)]);
            data.push(image.u.data[image.u.offset(col, row)]);
        }
    }

    RawFrame::from_nv21(width, height, data, timestamp_us)
}

/// Convert an NV21 frame to RGB using full-range BT.601 coefficients.
pub fn nv21_to_rgb(frame: &RawFrame) -> RgbImage {
    let width = frame.width() as usize;
    let luma = frame.luma();
    let chroma = frame.chroma();

    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let (x, y) = (x as usize, y as usize);
        let c = (y / 2) * width + (x / 2) * 2;
        yuv_to_rgb(luma[y * width + x], chroma[c + 1], chroma[c])
    })
}

/// Fixed-point (16.16) BT.601 full-range conversion.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let y = i32::from(y);
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;

    let r = y + ((91_881 * v) >> 16);
    let g = y - ((22_554 * u + 46_802 * v) >> 16);
    let b = y + ((116_130 * u) >> 16);

    Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Decode compressed image bytes (JPEG, PNG) into RGB.
///
/// Malformed input becomes [`PipelineError::Decode`].
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("empty image payload".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| PipelineError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::types::Plane;
    use proptest::prelude::*;

    /// Strided YUV_420_888-style buffers with padding at the end of each row.
    struct PaddedPlanes {
        width: u32,
        height: u32,
        y: Vec<u8>,
        y_stride: usize,
        u: Vec<u8>,
        v: Vec<u8>,
        c_stride: usize,
        c_pixel: usize,
    }

    impl PaddedPlanes {
        fn new(width: u32, height: u32, y_pad: usize, c_pad: usize, c_pixel: usize) -> Self {
            let (w, h) = (width as usize, height as usize);
            let y_stride = w + y_pad;
            let c_stride = (w / 2) * c_pixel + c_pad;
            let mut y = vec![0xEE; y_stride * h];
            for row in 0..h {
                for col in 0..w {
                    y[row * y_stride + col] = ((row * 7 + col * 3) % 256) as u8;
                }
            }
            let mut u = vec![0xEE; c_stride * (h / 2)];
            let mut v = vec![0xEE; c_stride * (h / 2)];
            for row in 0..h / 2 {
                for col in 0..w / 2 {
                    u[row * c_stride + col * c_pixel] = (100 + row + col) as u8;
                    v[row * c_stride + col * c_pixel] = (200 - row - col) as u8;
                }
            }
            Self {
                width,
                height,
                y,
                y_stride,
                u,
                v,
                c_stride,
                c_pixel,
            }
        }

        fn view(&self) -> PlanarImage<'_> {
            PlanarImage {
                width: self.width,
                height: self.height,
                y: Plane::new(&self.y, self.y_stride, 1),
                u: Plane::new(&self.u, self.c_stride, self.c_pixel),
                v: Plane::new(&self.v, self.c_stride, self.c_pixel),
            }
        }
    }

    #[test]
    fn pack_produces_three_halves_bytes_per_pixel() {
        let planes = PaddedPlanes::new(8, 6, 0, 0, 1);
        let frame = pack_nv21(&planes.view(), 0).unwrap();
        assert_eq!(frame.data().len(), 8 * 6 * 3 / 2);
    }

    #[test]
    fn pack_skips_row_padding_in_luma() {
        let planes = PaddedPlanes::new(4, 2, 12, 0, 1);
        let frame = pack_nv21(&planes.view(), 0).unwrap();
        assert!(!frame.luma().contains(&0xEE));
        assert_eq!(frame.luma()[4], planes.y[planes.y_stride]);
    }

    #[test]
    fn pack_interleaves_v_before_u_honouring_strides() {
        let planes = PaddedPlanes::new(4, 4, 3, 5, 2);
        let frame = pack_nv21(&planes.view(), 0).unwrap();
        let chroma = frame.chroma();
        // Row-major over the 2x2 chroma grid: (0,0) (1,0) (0,1) (1,1)
        assert_eq!(chroma, &[200, 100, 199, 101, 199, 101, 198, 102]);
    }

    #[test]
    fn pack_rejects_odd_dimensions() {
        let planes = PaddedPlanes::new(4, 4, 0, 0, 1);
        let mut view = planes.view();
        view.width = 3;
        assert!(matches!(pack_nv21(&view, 0), Err(PipelineError::Encode(_))));
    }

    #[test]
    fn pack_rejects_truncated_chroma_plane() {
        let planes = PaddedPlanes::new(8, 8, 0, 0, 2);
        let mut view = planes.view();
        view.u.data = &planes.u[..planes.u.len() - 4];
        assert!(matches!(pack_nv21(&view, 0), Err(PipelineError::Encode(_))));
    }

    #[test]
    fn pack_preserves_timestamp() {
        let planes = PaddedPlanes::new(2, 2, 0, 0, 1);
        let frame = pack_nv21(&planes.view(), 1234).unwrap();
        assert_eq!(frame.timestamp_us(), 1234);
    }

    #[test]
    fn grey_pixels_convert_to_grey() {
        let frame = RawFrame::from_nv21(2, 2, vec![128, 128, 128, 128, 128, 128], 0).unwrap();
        let rgb = nv21_to_rgb(&frame);
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([128, 128, 128]));
    }

    #[test]
    fn strong_v_converts_towards_red() {
        let frame = RawFrame::from_nv21(2, 2, vec![128, 128, 128, 128, 255, 128], 0).unwrap();
        let px = nv21_to_rgb(&frame).get_pixel(0, 0).0;
        assert!(px[0] > 250, "red channel {px:?}");
        assert!(px[1] < 128, "green channel {px:?}");
    }

    #[test]
    fn decode_reads_png_bytes() {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&png).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn decode_of_empty_payload_is_an_error() {
        assert!(matches!(decode_image(&[]), Err(PipelineError::Decode(_))));
    }

    #[test]
    fn decode_of_truncated_jpeg_is_an_error() {
        let err = decode_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    proptest! {
        #[test]
        fn packed_frame_survives_repacking(
            half_w in 1u32..24,
            half_h in 1u32..24,
            seed in any::<u8>(),
        ) {
            let (width, height) = (half_w * 2, half_h * 2);
            let data: Vec<u8> = (0..RawFrame::nv21_len(width, height))
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let frame = RawFrame::from_nv21(width, height, data, 9).unwrap();

            let repacked = pack_nv21(&frame.planes(), frame.timestamp_us()).unwrap();
            prop_assert_eq!(repacked, frame);
        }

        #[test]
        fn strided_source_samples_land_in_nv21_slots(
            half_w in 1u32..16,
            half_h in 1u32..16,
            y_pad in 0usize..9,
            c_pad in 0usize..9,
            c_pixel in 1usize..3,
        ) {
            let planes = PaddedPlanes::new(half_w * 2, half_h * 2, y_pad, c_pad, c_pixel);
            let source = planes.view();
            let frame = pack_nv21(&source, 0).unwrap();
            let packed = frame.planes();

            for row in 0..(half_h * 2) as usize {
                for col in 0..(half_w * 2) as usize {
                    prop_assert_eq!(
                        packed.y.data[packed.y.offset(col, row)],
                        source.y.data[source.y.offset(col, row)]
                    );
                }
            }
            for row in 0..half_h as usize {
                for col in 0..half_w as usize {
                    prop_assert_eq!(
                        packed.u.data[packed.u.offset(col, row)],
                        source.u.data[source.u.offset(col, row)]
                    );
                    prop_assert_eq!(
                        packed.v.data[packed.v.offset(col, row)],
                        source.v.data[source.v.offset(col, row)]
                    );
                }
            }
        }
    }
}
