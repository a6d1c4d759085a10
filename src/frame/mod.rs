// Frame handling: planar packing, chroma conversion, compression, and zoom.

pub mod codec;
pub mod compress;
pub mod types;
pub mod zoom;

pub use types::{EncodedImage, PixelFormat, PlanarImage, Plane, RawFrame};
