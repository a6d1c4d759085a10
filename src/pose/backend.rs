use fast_image_resize as fr;
use fr::images::{Image, ImageRef};
use fr::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;

use crate::error::{PipelineError, Result};
use crate::pose::types::DetectionTensor;

/// Side length of the square input most pose models expect.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// A frame resized and normalized for the model: `size` × `size` RGB
/// floats in `[0, 1]`, NHWC order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub size: u32,
    pub data: Vec<f32>,
}

/// Pose-estimation runtime, local or remote.
///
/// Implementations own their model resources. `run` is only ever called from
/// the single inference worker, so at most one call is in flight.
pub trait InferenceBackend: Send {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32 {
        DEFAULT_INPUT_SIZE
    }

    /// Run the model on a prepared input and return its raw output tensor.
    /// Coordinates in the tensor are normalized to the input square.
    fn run(&mut self, input: &ModelInput) -> Result<DetectionTensor>;

    /// Release model resources. Called exactly once at shutdown.
    fn close(&mut self);
}

/// Owns a backend and guarantees `close` runs once, on request or on drop.
pub struct BackendHandle {
    backend: Option<Box<dyn InferenceBackend>>,
}

impl BackendHandle {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Prepare `image` at the backend's input size and run the model.
    pub fn run(&mut self, image: &RgbImage) -> Result<DetectionTensor> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(PipelineError::Inference("backend already closed".to_string()));
        };
        let input = prepare_input(image, backend.input_size())?;
        backend.run(&input)
    }

    /// Close the backend. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
            tracing::info!("inference backend closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resize `image` to a `size` × `size` square and flatten it to normalized
/// `[0, 1]` RGB floats in NHWC order, ready for a model input tensor.
pub fn prepare_input(image: &RgbImage, size: u32) -> Result<ModelInput> {
    let size = size.max(1);
    let (width, height) = image.dimensions();
    let src_image = ImageRef::new(width, height, image.as_raw(), PixelType::U8x3)
        .map_err(|e| PipelineError::Inference(format!("model input: {e}")))?;
    let mut dst_image = Image::new(size, size, PixelType::U8x3);

    let options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| PipelineError::Inference(format!("model input resize failed: {e}")))?;

    let data = dst_image
        .buffer()
        .iter()
        .map(|&channel| f32::from(channel) / 255.0)
        .collect();
    Ok(ModelInput { size, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        closes: Arc<AtomicUsize>,
    }

    impl InferenceBackend for CountingBackend {
        fn run(&mut self, _input: &ModelInput) -> Result<DetectionTensor> {
            Ok(DetectionTensor::zeros(1))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn handle_closes_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut handle = BackendHandle::new(Box::new(CountingBackend {
            closes: Arc::clone(&closes),
        }));
        handle.close();
        handle.close();
        drop(handle);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_closes_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(BackendHandle::new(Box::new(CountingBackend {
            closes: Arc::clone(&closes),
        })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_after_close_is_an_inference_error() {
        let mut handle = BackendHandle::new(Box::new(CountingBackend {
            closes: Arc::new(AtomicUsize::new(0)),
        }));
        handle.close();
        assert!(handle.is_closed());
        let err = handle.run(&RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn prepare_input_normalizes_to_unit_range() {
        let img = RgbImage::from_pixel(320, 240, Rgb([255, 0, 51]));
        let input = prepare_input(&img, 8).unwrap();
        assert_eq!(input.size, 8);
        assert_eq!(input.data.len(), 8 * 8 * 3);
        assert!((input.data[0] - 1.0).abs() < 1e-6);
        assert!(input.data[1].abs() < 1e-6);
        assert!((input.data[2] - 0.2).abs() < 1e-6);
    }

    /// Records the input size it was handed.
    struct SizedBackend {
        size: u32,
        seen: Arc<AtomicUsize>,
    }

    impl InferenceBackend for SizedBackend {
        fn input_size(&self) -> u32 {
            self.size
        }

        fn run(&mut self, input: &ModelInput) -> Result<DetectionTensor> {
            self.seen.store(input.data.len(), Ordering::SeqCst);
            Ok(DetectionTensor::zeros(1))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn handle_prepares_input_at_backend_size() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut handle = BackendHandle::new(Box::new(SizedBackend {
            size: 16,
            seen: Arc::clone(&seen),
        }));
        handle.run(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 16 * 16 * 3);
    }

    #[test]
    fn default_input_size_is_square_224() {
        let backend = CountingBackend {
            closes: Arc::new(AtomicUsize::new(0)),
        };
        assert_eq!(backend.input_size(), DEFAULT_INPUT_SIZE);
    }
}
