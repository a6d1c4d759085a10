use frame_wire::WireError;
use thiserror::Error;

/// Pipeline errors.
///
/// Connection-level variants (`Connect`, `NotConnected`, `Protocol`) always
/// leave the connection torn down. Per-frame variants (`Decode`,
/// `Inference`, `Encode`) only cost the frame that raised them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(String),

    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Whether this error only affects the frame that raised it.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode(_) | PipelineError::Inference(_) | PipelineError::Encode(_)
        )
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
