use crate::pose::skeleton::{
    CONFIDENCE_CHANNEL, DETECTION_THRESHOLD, KEYPOINT_CHANNEL, KEYPOINT_STRIDE,
};
use crate::pose::types::{BoundingBox, Detection, DetectionTensor, Keypoint};

/// Decode every anchor whose objectness exceeds [`DETECTION_THRESHOLD`].
///
/// Weak anchors are dropped here so suppression only sees candidates.
/// Keypoints are copied verbatim; their own confidences are checked at
/// render time.
pub fn decode(tensor: &DetectionTensor) -> Vec<Detection> {
    (0..tensor.anchors())
        .filter(|&anchor| tensor.get(CONFIDENCE_CHANNEL, anchor) > DETECTION_THRESHOLD)
        .map(|anchor| decode_anchor(tensor, anchor))
        .collect()
}

fn decode_anchor(tensor: &DetectionTensor, anchor: usize) -> Detection {
    let bbox = BoundingBox::new(
        tensor.get(0, anchor),
        tensor.get(1, anchor),
        tensor.get(2, anchor),
        tensor.get(3, anchor),
    );
    let keypoints = std::array::from_fn(|k| {
        let base = KEYPOINT_CHANNEL + k * KEYPOINT_STRIDE;
        Keypoint::new(
            tensor.get(base, anchor),
            tensor.get(base + 1, anchor),
            tensor.get(base + 2, anchor),
        )
    });
    Detection {
        bbox,
        confidence: tensor.get(CONFIDENCE_CHANNEL, anchor),
        keypoints,
    }
}
