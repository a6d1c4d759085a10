use std::time::Instant;

use super::session::FrameSource;
use crate::error::Result;
use crate::frame::{PlanarImage, Plane};

/// Row padding added to every plane, the way camera HALs align rows.
const ROW_PADDING: usize = 16;

/// A fake camera producing a moving test pattern.
///
/// Frames are laid out like a hardware 4:2:0 buffer: padded rows, and V/U
/// samples interleaved in one allocation (pixel stride 2). A bright block
/// sweeps across a diagonal gradient so zoom and overlays have something
/// to show.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    luma: Vec<u8>,
    chroma: Vec<u8>,
    tick: u64,
    limit: Option<u64>,
    started: Instant,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        let luma_stride = width as usize + ROW_PADDING;
        let chroma_stride = width as usize + ROW_PADDING;
        Self {
            width,
            height,
            luma: vec![0; luma_stride * height as usize],
            chroma: vec![128; chroma_stride * (height as usize).div_ceil(2)],
            tick: 0,
            limit: None,
            started: Instant::now(),
        }
    }

    /// End after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    fn luma_stride(&self) -> usize {
        self.width as usize + ROW_PADDING
    }

    fn chroma_stride(&self) -> usize {
        self.width as usize + ROW_PADDING
    }

    fn paint(&mut self) {
        let (w, h) = (self.width as usize, self.height as usize);
        let luma_stride = self.luma_stride();
        let chroma_stride = self.chroma_stride();
        let shift = self.tick as usize;

        let block = (w / 4).max(1);
        let block_x = (shift * 4) % w.max(1);
        let block_y = h / 2 - (h / 2).min(block / 2);

        for row in 0..h {
            let line = &mut self.luma[row * luma_stride..row * luma_stride + w];
            for (col, px) in line.iter_mut().enumerate() {
                let inside = col >= block_x
                    && col < block_x + block
                    && row >= block_y
                    && row < block_y + block;
                *px = if inside {
                    235
                } else {
                    (((col + row + shift) * 255) / (w + h).max(1)) as u8
                };
            }
        }

        for row in 0..h / 2 {
            for col in 0..w / 2 {
                let at = row * chroma_stride + col * 2;
                self.chroma[at] = (96 + (row * 64) / (h / 2).max(1)) as u8;
                self.chroma[at + 1] = (96 + ((col + shift) * 64 / (w / 2).max(1)) % 64) as u8;
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn capture(&mut self, deliver: &mut dyn FnMut(&PlanarImage<'_>, u64)) -> Result<bool> {
        if self.limit.is_some_and(|limit| self.tick >= limit) {
            return Ok(false);
        }
        self.paint();
        self.tick += 1;

        let chroma_stride = self.chroma_stride();
        let image = PlanarImage {
            width: self.width,
            height: self.height,
            y: Plane::new(&self.luma, self.luma_stride(), 1),
            v: Plane::new(&self.chroma, chroma_stride, 2),
            u: Plane::new(self.chroma.get(1..).unwrap_or(&[]), chroma_stride, 2),
        };
        deliver(&image, self.started.elapsed().as_micros() as u64);
        Ok(true)
    }
}
