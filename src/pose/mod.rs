// Pose estimation postprocessing: tensor decoding, suppression, skeleton.

pub mod backend;
pub mod decoder;
pub mod skeleton;
pub mod suppression;
pub mod types;

pub use backend::{InferenceBackend, ModelInput};
pub use types::{BoundingBox, Detection, DetectionSet, DetectionTensor, Keypoint};
