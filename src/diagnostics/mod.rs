pub mod stats;

pub use stats::{DropReason, PipelineSnapshot, PipelineStats};
