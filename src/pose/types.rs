use crate::error::{PipelineError, Result};
use crate::pose::skeleton::{KEYPOINT_COUNT, POSE_CHANNELS};

/// One anatomical landmark, normalized to `0..1` of the model input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Whether the keypoint's own confidence clears `threshold`.
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// Axis-aligned box stored as centre and size, normalized to `0..1`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
        }
    }

    /// Corners as `(left, top, right, bottom)`.
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);
        (
            self.cx - half_w,
            self.cy - half_h,
            self.cx + half_w,
            self.cy + half_h,
        )
    }

    pub fn area(&self) -> f32 {
        let (left, top, right, bottom) = self.corners();
        (right - left) * (bottom - top)
    }
}

/// A single decoded person: box, objectness, and 17 keypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub keypoints: [Keypoint; KEYPOINT_COUNT],
}

/// Detections for one frame after suppression, by descending confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet(Vec<Detection>);

impl DetectionSet {
    pub(crate) fn from_sorted(detections: Vec<Detection>) -> Self {
        Self(detections)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.0
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Raw model output with axes `[batch = 1, channel, anchor]`, stored
/// channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTensor {
    channels: usize,
    anchors: usize,
    data: Vec<f32>,
}

impl DetectionTensor {
    /// Wrap a flat `channels * anchors` buffer.
    pub fn new(channels: usize, anchors: usize, data: Vec<f32>) -> Result<Self> {
        if channels < POSE_CHANNELS {
            return Err(PipelineError::Inference(format!(
                "pose tensor needs at least {POSE_CHANNELS} channels, got {channels}"
            )));
        }
        if data.len() != channels * anchors {
            return Err(PipelineError::Inference(format!(
                "tensor data has {} values, shape [1, {channels}, {anchors}] needs {}",
                data.len(),
                channels * anchors
            )));
        }
        Ok(Self {
            channels,
            anchors,
            data,
        })
    }

    /// Build from a shape and flat buffer as reported by a runtime.
    pub fn from_shape(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        match shape {
            [1, channels, anchors] => Self::new(*channels, *anchors, data),
            other => Err(PipelineError::Inference(format!(
                "expected tensor shape [1, channels, anchors], got {other:?}"
            ))),
        }
    }

    /// An all-zero tensor, filled in by tests and mock backends.
    pub fn zeros(anchors: usize) -> Self {
        Self {
            channels: POSE_CHANNELS,
            anchors,
            data: vec![0.0; POSE_CHANNELS * anchors],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn anchors(&self) -> usize {
        self.anchors
    }

    /// Value at (`channel`, `anchor`).
    pub fn get(&self, channel: usize, anchor: usize) -> f32 {
        self.data[channel * self.anchors + anchor]
    }

    pub fn set(&mut self, channel: usize, anchor: usize, value: f32) {
        self.data[channel * self.anchors + anchor] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_expand_from_centre() {
        let b = BoundingBox::new(0.5, 0.5, 0.2, 0.4);
        let (l, t, r, bt) = b.corners();
        assert!((l - 0.4).abs() < 1e-6);
        assert!((t - 0.3).abs() < 1e-6);
        assert!((r - 0.6).abs() < 1e-6);
        assert!((bt - 0.7).abs() < 1e-6);
        assert!((b.area() - 0.08).abs() < 1e-6);
    }

    #[test]
    fn keypoint_visibility_is_strict() {
        assert!(!Keypoint::new(0.0, 0.0, 0.30).is_visible(0.30));
        assert!(Keypoint::new(0.0, 0.0, 0.31).is_visible(0.30));
    }

    #[test]
    fn tensor_rejects_too_few_channels() {
        assert!(DetectionTensor::new(5, 1, vec![0.0; 5]).is_err());
    }

    #[test]
    fn tensor_rejects_mismatched_data() {
        assert!(DetectionTensor::new(56, 2, vec![0.0; 111]).is_err());
    }

    #[test]
    fn tensor_from_shape_requires_batch_of_one() {
        assert!(DetectionTensor::from_shape(&[2, 56, 1], vec![0.0; 112]).is_err());
        assert!(DetectionTensor::from_shape(&[56, 1], vec![0.0; 56]).is_err());
        let t = DetectionTensor::from_shape(&[1, 56, 3], vec![0.0; 168]).unwrap();
        assert_eq!(t.anchors(), 3);
    }

    #[test]
    fn tensor_indexes_channel_major() {
        let mut t = DetectionTensor::zeros(4);
        t.set(4, 2, 0.9);
        assert_eq!(t.get(4, 2), 0.9);
        assert_eq!(t.get(4, 1), 0.0);
        assert_eq!(t.get(5, 2), 0.0);
    }
}
