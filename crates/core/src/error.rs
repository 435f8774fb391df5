//! Error types for the detection pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    /// Bad cutoffs, order or sample rate. The run must not start.
    #[error("invalid filter spec: {0}")]
    InvalidSpec(String),

    #[error("block of {len} samples is too short, filter needs more than {required}")]
    BlockTooShort { len: usize, required: usize },

    #[error("empty audio block")]
    EmptyBlock,

    #[error("empty input sequence")]
    EmptyInput,

    /// Surfaced unchanged from the audio source.
    #[error("audio device error: {0}")]
    Device(String),

    #[error("invalid detector config: {0}")]
    InvalidConfig(String),
}
