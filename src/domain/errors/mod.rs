// Domain errors - Error types for the domain layer

use thiserror::Error;

/// Message reported when the source bitrate is at or below the floor.
pub const INSUFFICIENT_BITRATE_MESSAGE: &str =
    "The provided bitrate is smaller than what is needed for compression; \
     try setting min_bitrate_check to false";

/// Message reported when rotation, bitrate or duration cannot be read.
pub const METADATA_UNAVAILABLE_MESSAGE: &str =
    "Failed to extract video meta-data, please try again";

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Invalid arguments provided
    #[error("Bad arguments: {0}")]
    BadArgs(String),
    /// Probing the source failed
    #[error("{}: {0}", METADATA_UNAVAILABLE_MESSAGE)]
    MetadataUnavailable(String),
    /// Source bitrate is at or below the minimum compressible bitrate
    #[error("{}", INSUFFICIENT_BITRATE_MESSAGE)]
    InsufficientSourceBitrate { source_bitrate: u64, floor: u64 },
    /// Invalid time range
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
    /// Unexpected codec status or codec failure
    #[error("Codec error: {0}")]
    Codec(String),
    /// Demuxer or muxer failure
    #[error("Container error: {0}")]
    Container(String),
    /// Storage destination failure
    #[error("Storage error: {0}")]
    Storage(String),
    /// Source handle could not be resolved to a readable file
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by codec, surface and container collaborators.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("codec: {0}")]
    Codec(String),
    #[error("container: {0}")]
    Container(String),
    #[error("surface: {0}")]
    Surface(String),
    #[error("frame wait timed out after {0:?}")]
    FrameTimeout(std::time::Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for DomainError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Container(msg) => DomainError::Container(msg),
            PipelineError::Io(e) => DomainError::Container(e.to_string()),
            other => DomainError::Codec(other.to_string()),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
