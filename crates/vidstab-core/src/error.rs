//! Error types for VidStab.

use thiserror::Error;

/// Main error type for stabilization jobs.
///
/// Degenerate motion estimates and short reads are recovered inside the
/// pipeline and never show up here; cancellation is reported as a job
/// outcome rather than an error.
#[derive(Error, Debug)]
pub enum VidstabError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Encoder could not be opened: {0}")]
    EncoderOpen(String),

    #[error("Muxer error: {0}")]
    Muxer(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("A job is already running for {0}")]
    JobBusy(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for VidStab operations.
pub type Result<T> = std::result::Result<T, VidstabError>;
