// Capture: frame sources and the session that drives them.

pub mod session;
pub mod synthetic;

pub use session::{CaptureSession, ErrorCallback, FrameCallback, FrameSource};
pub use synthetic::SyntheticSource;
