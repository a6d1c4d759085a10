// Pipeline: backpressure, operator controls, and frame routing.

pub mod controls;
pub mod inflight;
pub mod orchestrator;

pub use controls::{Command, Controls, FrameConfig};
pub use inflight::{InFlight, InFlightGuard};
pub use orchestrator::{FrameRouter, InferenceMode, Pipeline};
