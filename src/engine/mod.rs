//! Transcode engine: video pump, audio passthrough and their shared setup

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::errors::{DomainError, PipelineResult};
use crate::domain::model::EncodingPlan;
use crate::ports::{CodecBackend, Demuxer, SeekMode, TrackFormat};

pub mod audio;
pub mod encoder;
pub mod progress;
pub mod pump;

use audio::AudioPass;
use progress::ProgressReporter;
use pump::VideoPipeline;

/// Tunables for the codec pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Bound on each non-blocking codec poll
    pub poll_timeout: Duration,
    /// Bound on waiting for a decoded frame to reach the bridge
    pub frame_timeout: Duration,
    /// Encoder frame rate when the source track has none
    pub default_frame_rate: u32,
    /// Seconds between I-frames when the source track has none
    pub default_i_frame_interval: u32,
    /// Audio copy buffer when the track reports no max input size
    pub audio_buffer_size: usize,
    /// Sync sample both tracks land on when seeking to the window start
    pub seek_mode: SeekMode,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_micros(100),
            frame_timeout: Duration::from_millis(2500),
            default_frame_rate: 30,
            default_i_frame_interval: 1,
            audio_buffer_size: 64 * 1024,
            seek_mode: SeekMode::NextSync,
        }
    }
}

/// How a transcode ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Completed,
    Cancelled,
}

/// One source-to-working-file transcode
#[derive(Debug, Clone, Copy)]
pub struct TranscodeJob<'a> {
    pub index: usize,
    pub source: &'a Path,
    pub output: &'a Path,
    pub plan: &'a EncodingPlan,
    pub disable_audio: bool,
}

/// Owns the demuxer and releases it when dropped
pub(crate) struct SourceDemuxer(Box<dyn Demuxer>);

impl Deref for SourceDemuxer {
    type Target = dyn Demuxer;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SourceDemuxer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for SourceDemuxer {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Runs the video pump and audio passthrough against a [`CodecBackend`]
pub struct Transcoder {
    backend: Arc<dyn CodecBackend>,
    config: PumpConfig,
}

impl Transcoder {
    pub fn new(backend: Arc<dyn CodecBackend>, config: PumpConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Transcode `job.source` into `job.output`.
    ///
    /// Blocking; call from a blocking-capable thread. Every codec, surface and
    /// track selection is released before this returns, whatever the outcome.
    #[instrument(skip_all, fields(index = job.index, source = %job.source.display()))]
    pub fn run(
        &self,
        job: &TranscodeJob<'_>,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<PumpOutcome, DomainError> {
        let window = job.plan.window;
        let mut demuxer = SourceDemuxer(self.backend.open_demuxer(job.source)?);

        let track = find_track(&*demuxer, TrackFormat::is_video)?
            .ok_or_else(|| DomainError::Container("source has no video track".to_string()))?;
        demuxer.select_track(track)?;
        demuxer.seek_to(window.start_us, self.config.seek_mode)?;
        let input_format = demuxer.track_format(track)?;
        let settings = encoder::derive_settings(job.plan, &input_format, &self.config);

        let mut muxer = self.backend.create_muxer(job.output, job.plan.rotation)?;

        info!(
            width = settings.width,
            height = settings.height,
            bitrate = settings.bitrate,
            frame_rate = settings.frame_rate,
            "Starting video pump"
        );

        let outcome = {
            let mut pipeline =
                VideoPipeline::open(self.backend.as_ref(), &mut *demuxer, track, &input_format, &settings)?;
            let outcome = pipeline.run(muxer.as_mut(), window, &self.config, cancel, progress)?;
            pipeline.release();
            outcome
        };
        if outcome == PumpOutcome::Cancelled {
            return Ok(PumpOutcome::Cancelled);
        }

        let audio = if job.disable_audio {
            AudioPass::Skipped
        } else {
            audio::copy_audio(&mut *demuxer, muxer.as_mut(), window, &self.config, cancel)?
        };
        debug!(?audio, "Audio passthrough done");
        if audio == AudioPass::Cancelled {
            return Ok(PumpOutcome::Cancelled);
        }

        muxer.finish()?;
        Ok(PumpOutcome::Completed)
    }
}

/// First track whose format satisfies `matches`
pub(crate) fn find_track(
    demuxer: &dyn Demuxer,
    matches: impl Fn(&TrackFormat) -> bool,
) -> PipelineResult<Option<usize>> {
    for track in 0..demuxer.track_count() {
        if matches(&demuxer.track_format(track)?) {
            return Ok(Some(track));
        }
    }
    Ok(None)
}
