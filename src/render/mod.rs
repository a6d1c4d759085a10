// Overlay rendering: boxes, keypoints, and skeleton edges.

pub mod overlay;

pub use overlay::{plan, render, Primitive, RenderConfig};
