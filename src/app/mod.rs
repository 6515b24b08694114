// Application layer - Use case interactors

pub mod compress_interactor;
pub mod container;
pub mod events;

// Re-export interactors
pub use compress_interactor::{BatchHandle, CompressionRequest, CompressorOptions, VideoCompressor};
pub use events::{ChannelListener, CompressionEvent};
