// Adapters - External system implementations

pub mod faststart;
pub mod fs_storage;
pub mod mock_codec;
#[cfg(feature = "libav")]
pub mod probe_libav;
pub mod source_resolver;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use faststart::FaststartAdapter;
pub use fs_storage::{AppSpecificStorage, CacheStorage, SaveLocation, SharedStorage};
pub use mock_codec::{MockCodecBackend, ScriptedMediaInfo};
#[cfg(feature = "libav")]
pub use probe_libav::LibavMediaInfo;
pub use source_resolver::LocalSourceResolver;
pub use toml_config::{AppConfig, CliOverrides};
pub use tracing_log::init_tracing;
