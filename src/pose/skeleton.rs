//! Fixed tables for the 17-keypoint COCO body layout.

/// Keypoints per detection.
pub const KEYPOINT_COUNT: usize = 17;

/// Values per keypoint in the tensor: x, y, confidence.
pub const KEYPOINT_STRIDE: usize = 3;

/// Tensor channel holding objectness confidence.
pub const CONFIDENCE_CHANNEL: usize = 4;

/// First tensor channel of the keypoint block.
pub const KEYPOINT_CHANNEL: usize = 5;

/// Channels a pose tensor must carry: 4 box + 1 confidence + 17 × 3.
pub const POSE_CHANNELS: usize = KEYPOINT_CHANNEL + KEYPOINT_COUNT * KEYPOINT_STRIDE;

/// Objectness below or at this value is dropped before suppression.
pub const DETECTION_THRESHOLD: f32 = 0.30;

/// Boxes overlapping a kept box by more than this IoU are suppressed.
pub const IOU_THRESHOLD: f32 = 0.45;

/// Keypoints (and skeleton edges) need confidence above this to be drawn.
pub const KEYPOINT_THRESHOLD: f32 = 0.30;

pub const NOSE: usize = 0;
pub const LEFT_EYE: usize = 1;
pub const RIGHT_EYE: usize = 2;
pub const LEFT_EAR: usize = 3;
pub const RIGHT_EAR: usize = 4;
pub const LEFT_SHOULDER: usize = 5;
pub const RIGHT_SHOULDER: usize = 6;
pub const LEFT_ELBOW: usize = 7;
pub const RIGHT_ELBOW: usize = 8;
pub const LEFT_WRIST: usize = 9;
pub const RIGHT_WRIST: usize = 10;
pub const LEFT_HIP: usize = 11;
pub const RIGHT_HIP: usize = 12;
pub const LEFT_KNEE: usize = 13;
pub const RIGHT_KNEE: usize = 14;
pub const LEFT_ANKLE: usize = 15;
pub const RIGHT_ANKLE: usize = 16;

/// Skeleton edges as pairs of keypoint indices.
pub const SKELETON: [(usize, usize); 17] = [
    // shoulders
    (LEFT_SHOULDER, RIGHT_SHOULDER),
    // left arm
    (LEFT_SHOULDER, LEFT_ELBOW),
    (LEFT_ELBOW, LEFT_WRIST),
    // right arm
    (RIGHT_SHOULDER, RIGHT_ELBOW),
    (RIGHT_ELBOW, RIGHT_WRIST),
    // torso sides
    (LEFT_SHOULDER, LEFT_HIP),
    (RIGHT_SHOULDER, RIGHT_HIP),
    // hips
    (LEFT_HIP, RIGHT_HIP),
    // left leg
    (LEFT_HIP, LEFT_KNEE),
    (LEFT_KNEE, LEFT_ANKLE),
    // right leg
    (RIGHT_HIP, RIGHT_KNEE),
    (RIGHT_KNEE, RIGHT_ANKLE),
    // face
    (NOSE, LEFT_EYE),
    (NOSE, RIGHT_EYE),
    (LEFT_EYE, RIGHT_EYE),
    (LEFT_EYE, LEFT_EAR),
    (RIGHT_EYE, RIGHT_EAR),
];
