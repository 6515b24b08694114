// Probe LibAV adapter - Source metadata read through FFmpeg

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use tracing::{debug, instrument};

use crate::domain::errors::DomainError;
use crate::ports::{MediaInfoPort, RawMetadata};

/// FFmpeg-backed [`MediaInfoPort`].
///
/// Values are handed over as strings, exactly like a platform metadata
/// retriever would, and left for the prober to validate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibavMediaInfo;

impl LibavMediaInfo {
    pub fn new() -> Result<Self, DomainError> {
        ffmpeg::init().map_err(|e| DomainError::MetadataUnavailable(format!("Failed to initialize FFmpeg: {}", e)))?;
        Ok(Self)
    }

    fn read(path: &Path) -> Result<RawMetadata, DomainError> {
        let unavailable = |e: ffmpeg::Error| DomainError::MetadataUnavailable(format!("{}: {}", path.display(), e));

        let ictx = ffmpeg::format::input(&path).map_err(unavailable)?;
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| DomainError::MetadataUnavailable(format!("{}: no video stream", path.display())))?;

        let (width, height) = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map(|video| (Some(video.width().to_string()), Some(video.height().to_string())))
            .unwrap_or((None, None));

        let rotation = stream
            .metadata()
            .get("rotate")
            .map(str::to_string)
            .or_else(|| Some("0".to_string()));

        let bitrate = Some(ictx.bit_rate()).filter(|b| *b > 0).map(|b| b.to_string());
        // Container duration is in AV_TIME_BASE (microsecond) units
        let duration_ms = Some(ictx.duration())
            .filter(|d| *d > 0)
            .map(|d| (d / 1000).to_string());

        Ok(RawMetadata { width, height, rotation, bitrate, duration_ms })
    }
}

#[async_trait]
impl MediaInfoPort for LibavMediaInfo {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn retrieve(&self, path: &Path) -> Result<RawMetadata, DomainError> {
        let path: PathBuf = path.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || Self::read(&path))
            .await
            .map_err(|e| DomainError::Internal(format!("metadata task failed: {}", e)))??;
        debug!(?raw, "Read source metadata");
        Ok(raw)
    }
}
