//! vidpress video compression library
//!
//! Plans a target bitrate, resolution and rotation from source metadata, then
//! drives decoder, frame bridge, encoder and muxer collaborators through a
//! cancellable transcode pump, reporting progress per item.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod ports;
pub mod probe;

// Re-export commonly used types
pub use app::{BatchHandle, ChannelListener, CompressionEvent, CompressionRequest, CompressorOptions, VideoCompressor};
pub use domain::errors::DomainError;
pub use domain::model::{Configuration, EncodingPlan, JobResult, ResizePolicy, SourceMetadata, TimeWindow, VideoQuality};
pub use error::{VidpressError, VidpressResult};
