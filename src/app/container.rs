use std::sync::Arc;

use crate::adapters::toml_config::AppConfig;
use crate::adapters::{FaststartAdapter, LocalSourceResolver};
use crate::app::compress_interactor::VideoCompressor;
use crate::ports::{CodecBackend, MediaInfoPort, SourceResolver, StorageDestination, StreamFinalizer};

pub trait AppContainer: Send + Sync {
    fn compressor(&self) -> Arc<VideoCompressor>;
    fn storage(&self) -> Arc<dyn StorageDestination>;
    fn finalizer(&self) -> Arc<dyn StreamFinalizer>;
}

/// Wires the filesystem adapters from [`AppConfig`] around a codec backend and
/// metadata source supplied by the platform
pub struct DefaultAppContainer {
    compressor: Arc<VideoCompressor>,
    storage: Arc<dyn StorageDestination>,
    finalizer: Arc<dyn StreamFinalizer>,
}

impl DefaultAppContainer {
    pub fn new(config: &AppConfig, backend: Arc<dyn CodecBackend>, media_info: Arc<dyn MediaInfoPort>) -> Self {
        let resolver = Arc::new(LocalSourceResolver::new(config.storage.working_dir()));
        let finalizer: Arc<dyn StreamFinalizer> = Arc::new(FaststartAdapter::new());
        let storage = config.storage.destination();

        let compressor = Arc::new(VideoCompressor::new(
            resolver as Arc<dyn SourceResolver>,
            media_info,
            backend,
            Arc::clone(&finalizer),
            config.compressor.options(),
        ));

        Self { compressor, storage, finalizer }
    }
}

impl AppContainer for DefaultAppContainer {
    fn compressor(&self) -> Arc<VideoCompressor> {
        Arc::clone(&self.compressor)
    }

    fn storage(&self) -> Arc<dyn StorageDestination> {
        Arc::clone(&self.storage)
    }

    fn finalizer(&self) -> Arc<dyn StreamFinalizer> {
        Arc::clone(&self.finalizer)
    }
}
