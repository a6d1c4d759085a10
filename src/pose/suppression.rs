//! Greedy non-max suppression over decoded detections.

use crate::pose::skeleton::IOU_THRESHOLD;
use crate::pose::types::{BoundingBox, Detection, DetectionSet};

/// Keeps the IoU finite when both boxes are degenerate.
const IOU_EPSILON: f32 = 1e-6;

/// Intersection-over-Union of two centre/size boxes, in `[0, 1]`.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let (a_left, a_top, a_right, a_bottom) = a.corners();
    let (b_left, b_top, b_right, b_bottom) = b.corners();

    let overlap_w = (a_right.min(b_right) - a_left.max(b_left)).max(0.0);
    let overlap_h = (a_bottom.min(b_bottom) - a_top.max(b_top)).max(0.0);
    let intersection = overlap_w * overlap_h;
    let union = a.area() + b.area() - intersection;

    (intersection / (union + IOU_EPSILON)).clamp(0.0, 1.0)
}

/// Sort by descending confidence (stable) and drop every detection that
/// overlaps an already-kept one by more than [`IOU_THRESHOLD`].
///
/// Deterministic for a given input order; ties keep their original order.
pub fn suppress(detections: Vec<Detection>) -> DetectionSet {
    let mut sorted = detections;
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; sorted.len()];
    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        let kept = sorted[i].bbox;
        for (candidate, flag) in sorted.iter().zip(suppressed.iter_mut()).skip(i + 1) {
            if !*flag && iou(&kept, &candidate.bbox) > IOU_THRESHOLD {
                *flag = true;
            }
        }
    }

    let kept = sorted
        .into_iter()
        .zip(suppressed)
        .filter_map(|(detection, dropped)| (!dropped).then_some(detection))
        .collect();
    DetectionSet::from_sorted(kept)
}
