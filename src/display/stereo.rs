use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbImage;

use super::{DisplaySurface, Eye, StereoLayout, View};
use crate::error::{PipelineError, Result};
use crate::frame::compress::compress_jpeg;
use crate::frame::EncodedImage;

/// Thread-safe ring buffer of presented images.
///
/// Stores up to `capacity` images, overwriting the oldest when full.
/// Images are held as `Arc` so readers never copy pixel buffers.
pub struct FrameBuffer {
    frames: Mutex<Vec<Option<Arc<RgbImage>>>>,
    capacity: usize,
    write_idx: Mutex<usize>,
    /// Monotonic counter incremented on each push, for change detection.
    sequence: AtomicU64,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let frames = (0..capacity).map(|_| None).collect();
        Self {
            frames: Mutex::new(frames),
            capacity,
            write_idx: Mutex::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Push a new image, overwriting the oldest if full.
    pub fn push(&self, image: Arc<RgbImage>) {
        if self.capacity == 0 {
            return;
        }
        let mut frames = self.frames.lock();
        let mut idx = self.write_idx.lock();
        frames[*idx] = Some(image);
        *idx = (*idx + 1) % self.capacity;
        self.sequence.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Most recently pushed image, if any.
    pub fn latest(&self) -> Option<Arc<RgbImage>> {
        if self.capacity == 0 {
            return None;
        }
        let frames = self.frames.lock();
        let idx = self.write_idx.lock();
        let latest_idx = if *idx == 0 {
            self.capacity - 1
        } else {
            *idx - 1
        };
        frames[latest_idx].clone()
    }
}

struct Slots {
    layout: Mutex<StereoLayout>,
    passthrough: FrameBuffer,
    left: FrameBuffer,
    right: FrameBuffer,
}

/// Two-eye display that keeps the latest image per eye plus the latest raw
/// passthrough frame. Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct StereoDisplay {
    slots: Arc<Slots>,
}

impl StereoDisplay {
    pub fn new(layout: StereoLayout) -> Self {
        Self {
            slots: Arc::new(Slots {
                layout: Mutex::new(layout),
                passthrough: FrameBuffer::new(2),
                left: FrameBuffer::new(2),
                right: FrameBuffer::new(2),
            }),
        }
    }

    pub fn layout(&self) -> StereoLayout {
        *self.slots.layout.lock()
    }

    /// Takes effect from the next presented image.
    pub fn set_layout(&self, layout: StereoLayout) {
        *self.slots.layout.lock() = layout;
    }

    fn eye(&self, eye: Eye) -> &FrameBuffer {
        match eye {
            Eye::Left => &self.slots.left,
            Eye::Right => &self.slots.right,
        }
    }

    pub fn latest(&self, eye: Eye) -> Option<Arc<RgbImage>> {
        self.eye(eye).latest()
    }

    pub fn latest_passthrough(&self) -> Option<Arc<RgbImage>> {
        self.slots.passthrough.latest()
    }

    /// Number of images shown on `eye` so far.
    pub fn sequence(&self, eye: Eye) -> u64 {
        self.eye(eye).sequence()
    }

    /// JPEG of what `eye` currently shows.
    pub fn snapshot_jpeg(&self, eye: Eye, quality: u8) -> Result<Option<EncodedImage>> {
        self.latest(eye)
            .map(|image| compress_jpeg(&image, quality))
            .transpose()
    }

    /// Write the current `eye` image to `dir` as
    /// `snapshot-<eye>-<sequence>.jpg`. `None` when nothing was shown yet.
    pub fn save_snapshot(&self, eye: Eye, dir: &Path, quality: u8) -> Result<Option<PathBuf>> {
        let Some(jpeg) = self.snapshot_jpeg(eye, quality)? else {
            return Ok(None);
        };
        let side = match eye {
            Eye::Left => "left",
            Eye::Right => "right",
        };
        let path = dir.join(format!("snapshot-{side}-{}.jpg", self.sequence(eye)));
        std::fs::write(&path, jpeg.as_bytes()).map_err(|source| PipelineError::Snapshot {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(path))
    }
}

impl DisplaySurface for StereoDisplay {
    fn present(&mut self, view: View, image: Arc<RgbImage>) {
        if view == View::Passthrough {
            self.slots.passthrough.push(Arc::clone(&image));
        }
        for &eye in self.layout().eyes(view) {
            self.eye(eye).push(Arc::clone(&image));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> Arc<RgbImage> {
        Arc::new(RgbImage::from_pixel(4, 4, Rgb([value, value, value])))
    }

    #[test]
    fn frame_buffer_returns_none_when_empty() {
        let buf = FrameBuffer::new(3);
        assert!(buf.latest().is_none());
        assert_eq!(buf.sequence(), 0);
    }

    #[test]
    fn frame_buffer_overwrites_oldest_when_full() {
        let buf = FrameBuffer::new(3);
        for v in 1..=4 {
            buf.push(solid(v));
        }
        assert_eq!(buf.latest().unwrap().get_pixel(0, 0).0, [4, 4, 4]);
        assert_eq!(buf.sequence(), 4);
    }

    #[test]
    fn frame_buffer_latest_returns_arc_not_clone() {
        let buf = FrameBuffer::new(3);
        buf.push(solid(42));
        let a = buf.latest().unwrap();
        let b = buf.latest().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn zero_capacity_buffer_ignores_pushes() {
        let buf = FrameBuffer::new(0);
        buf.push(solid(1));
        assert!(buf.latest().is_none());
    }

    #[test]
    fn raw_left_routes_views_to_separate_eyes() {
        let mut display = StereoDisplay::new(StereoLayout::RawLeft);
        display.present(View::Passthrough, solid(10));
        display.present(View::Processed, solid(20));

        assert_eq!(display.latest(Eye::Left).unwrap().get_pixel(0, 0).0, [10; 3]);
        assert_eq!(display.latest(Eye::Right).unwrap().get_pixel(0, 0).0, [20; 3]);
        assert_eq!(
            display.latest_passthrough().unwrap().get_pixel(0, 0).0,
            [10; 3]
        );
    }

    #[test]
    fn mirrored_shows_same_processed_image_in_both_eyes() {
        let mut display = StereoDisplay::new(StereoLayout::Mirrored);
        display.present(View::Passthrough, solid(10));
        assert!(display.latest(Eye::Left).is_none());

        display.present(View::Processed, solid(20));
        let left = display.latest(Eye::Left).unwrap();
        let right = display.latest(Eye::Right).unwrap();
        assert!(Arc::ptr_eq(&left, &right));
        assert!(display.latest_passthrough().is_some());
    }

    #[test]
    fn clones_share_slots_and_layout_changes() {
        let display = StereoDisplay::new(StereoLayout::RawLeft);
        let mut presenter = display.clone();
        display.set_layout(StereoLayout::Mirrored);
        presenter.present(View::Processed, solid(5));
        assert_eq!(display.sequence(Eye::Left), 1);
        assert_eq!(display.sequence(Eye::Right), 1);
    }

    #[test]
    fn snapshot_is_none_until_eye_has_an_image() {
        let mut display = StereoDisplay::new(StereoLayout::RawLeft);
        assert!(display.snapshot_jpeg(Eye::Right, 80).unwrap().is_none());
        display.present(View::Processed, solid(200));
        let jpeg = display.snapshot_jpeg(Eye::Right, 80).unwrap().unwrap();
        assert_eq!(&jpeg.as_bytes()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn save_snapshot_writes_jpeg_named_by_eye_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut display = StereoDisplay::new(StereoLayout::RawLeft);
        assert!(display
            .save_snapshot(Eye::Right, dir.path(), 80)
            .unwrap()
            .is_none());

        display.present(View::Processed, solid(200));
        display.present(View::Processed, solid(100));
        let path = display
            .save_snapshot(Eye::Right, dir.path(), 80)
            .unwrap()
            .unwrap();
        assert_eq!(path, dir.path().join("snapshot-right-2.jpg"));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn save_snapshot_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let mut display = StereoDisplay::new(StereoLayout::RawLeft);
        display.present(View::Passthrough, solid(50));
        let err = display
            .save_snapshot(Eye::Left, &missing, 80)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Snapshot { .. }));
    }
}
