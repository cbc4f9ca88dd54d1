use thiserror::Error;

/// Why a single frame failed to process. Every variant surfaces as an
/// `error` outbound result scoped to that frame; none abort the daemon.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Payload did not decode into a tagged encoding vector.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error(transparent)]
    Match(#[from] MatchError),
    /// Durable append failed after acceptance was already committed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("encoding dimension mismatch: probe has {probe}, repository expects {expected}")]
    DimensionMismatch { probe: usize, expected: usize },
}

/// Event-sink append or read failure. Reported, never fatal.
#[derive(Debug, Error)]
#[error("event sink: {message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
