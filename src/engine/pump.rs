//! Decode → frame bridge → encode → mux state machine

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::domain::errors::{DomainError, PipelineError};
use crate::domain::model::TimeWindow;
use crate::engine::encoder::open_encoder;
use crate::engine::progress::ProgressReporter;
use crate::engine::{PumpConfig, PumpOutcome};
use crate::ports::*;

/// Sample buffer size when the source track reports no max input size
const DEFAULT_SAMPLE_BUFFER_SIZE: usize = 1024 * 1024;

/// Decoder, encoder and bridge bound to one selected video track.
///
/// Components are released exactly once, by [`VideoPipeline::release`] or on drop,
/// including when opening fails halfway.
pub(crate) struct VideoPipeline<'a> {
    demuxer: &'a mut dyn Demuxer,
    track: usize,
    sample_buffer_size: usize,
    decoder: Option<Box<dyn VideoDecoder>>,
    encoder: Option<Box<dyn VideoEncoder>>,
    bridge: Option<Box<dyn FrameBridge>>,
    released: bool,
}

impl<'a> VideoPipeline<'a> {
    /// Create, wire and start the encoder, bridge and decoder
    pub(crate) fn open(
        backend: &dyn CodecBackend,
        demuxer: &'a mut dyn Demuxer,
        track: usize,
        input_format: &TrackFormat,
        settings: &EncoderSettings,
    ) -> Result<Self, DomainError> {
        let mut pipeline = VideoPipeline {
            demuxer,
            track,
            sample_buffer_size: input_format.max_input_size.unwrap_or(DEFAULT_SAMPLE_BUFFER_SIZE),
            decoder: None,
            encoder: None,
            bridge: None,
            released: false,
        };

        let encoder = pipeline.encoder.insert(open_encoder(backend, settings)?);
        let input_surface = encoder.create_input_surface()?;
        let bridge = pipeline.bridge.insert(backend.create_frame_bridge()?);
        bridge.make_current(&input_surface)?;
        encoder.start()?;

        let decoder = pipeline.decoder.insert(backend.create_decoder(&input_format.mime)?);
        decoder.configure(input_format, &bridge.output_surface())?;
        decoder.start()?;

        Ok(pipeline)
    }

    /// Pump until the encoder reports end of stream or `cancel` fires
    pub(crate) fn run(
        &mut self,
        muxer: &mut dyn Muxer,
        window: TimeWindow,
        config: &PumpConfig,
        cancel: &CancellationToken,
        progress: &mut ProgressReporter,
    ) -> Result<PumpOutcome, DomainError> {
        let (Some(decoder), Some(encoder), Some(bridge)) = (
            self.decoder.as_deref_mut(),
            self.encoder.as_deref_mut(),
            self.bridge.as_deref_mut(),
        ) else {
            return Err(DomainError::Internal("video pipeline already released".to_string()));
        };

        let mut pump = Pump {
            demuxer: &mut *self.demuxer,
            decoder,
            encoder,
            bridge,
            muxer,
            track: self.track,
            window,
            config,
            sample: vec![0; self.sample_buffer_size],
            muxer_track: None,
        };
        pump.run(cancel, progress)
    }

    /// Unselect the track and stop/release every component; idempotent
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(err) = self.demuxer.unselect_track(self.track) {
            debug!(error = %err, "Unselecting video track failed");
        }
        if let Some(mut decoder) = self.decoder.take() {
            if let Err(err) = decoder.stop() {
                debug!(error = %err, "Stopping decoder failed");
            }
            decoder.release();
        }
        if let Some(mut encoder) = self.encoder.take() {
            if let Err(err) = encoder.stop() {
                debug!(error = %err, "Stopping encoder failed");
            }
            encoder.release();
        }
        if let Some(mut bridge) = self.bridge.take() {
            bridge.release();
        }
    }
}

impl Drop for VideoPipeline<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

struct Pump<'p> {
    demuxer: &'p mut dyn Demuxer,
    decoder: &'p mut dyn VideoDecoder,
    encoder: &'p mut dyn VideoEncoder,
    bridge: &'p mut dyn FrameBridge,
    muxer: &'p mut dyn Muxer,
    track: usize,
    window: TimeWindow,
    config: &'p PumpConfig,
    sample: Vec<u8>,
    muxer_track: Option<usize>,
}

impl Pump<'_> {
    fn run(&mut self, cancel: &CancellationToken, progress: &mut ProgressReporter) -> Result<PumpOutcome, DomainError> {
        let mut input_done = false;
        let mut output_done = false;

        while !output_done {
            if !input_done {
                input_done = self.feed()?;
            }

            let mut decoder_available = true;
            let mut encoder_available = true;

            while decoder_available || encoder_available {
                if cancel.is_cancelled() {
                    debug!("Cancellation observed in pump");
                    return Ok(PumpOutcome::Cancelled);
                }

                let encoder_status = self.encoder.dequeue_output_buffer(self.config.poll_timeout)?;
                match encoder_status {
                    OutputStatus::TryAgainLater => encoder_available = false,
                    OutputStatus::FormatChanged => {
                        if self.muxer_track.is_none() {
                            let format = self.encoder.output_format()?;
                            self.muxer_track = Some(self.muxer.add_track(&format, false)?);
                            debug!(?format, "Registered video track with muxer");
                        }
                    }
                    OutputStatus::BuffersChanged => {}
                    OutputStatus::Buffer { index, info } => {
                        output_done = self.drain_encoder_buffer(index, &info)?;
                    }
                    OutputStatus::Unknown(code) => {
                        return Err(DomainError::Codec(format!(
                            "unexpected result from encoder.dequeue_output_buffer: {}",
                            code
                        )));
                    }
                }

                if output_done {
                    break;
                }
                if encoder_status != OutputStatus::TryAgainLater {
                    continue;
                }

                match self.decoder.dequeue_output_buffer(self.config.poll_timeout)? {
                    OutputStatus::TryAgainLater => decoder_available = false,
                    OutputStatus::FormatChanged | OutputStatus::BuffersChanged => {}
                    OutputStatus::Buffer { index, info } => {
                        self.drain_decoder_buffer(index, &info, progress)?;
                        if info.is_end_of_stream() {
                            decoder_available = false;
                            self.encoder.signal_end_of_input_stream()?;
                        }
                    }
                    OutputStatus::Unknown(code) => {
                        return Err(DomainError::Codec(format!(
                            "unexpected result from decoder.dequeue_output_buffer: {}",
                            code
                        )));
                    }
                }
            }
        }

        Ok(PumpOutcome::Completed)
    }

    /// Queue the next sample, or end of stream once the track or window runs out.
    ///
    /// Returns true once end of stream has been queued.
    fn feed(&mut self) -> Result<bool, DomainError> {
        match self.demuxer.sample_track_index() {
            Some(track) if track == self.track => {
                let Some(input) = self.decoder.dequeue_input_buffer(self.config.poll_timeout)? else {
                    return Ok(false);
                };

                if let Some(size) = self.demuxer.sample_size() {
                    if size > self.sample.len() {
                        self.sample.resize(size, 0);
                    }
                }

                match self.demuxer.read_sample_data(&mut self.sample)? {
                    None => {
                        self.queue_end_of_stream(input)?;
                        Ok(true)
                    }
                    Some(size) => {
                        let sample_time = self.demuxer.sample_time().unwrap_or(i64::MAX);
                        if sample_time > self.window.end_us {
                            trace!(sample_time, end_us = self.window.end_us, "Reached window end");
                            self.queue_end_of_stream(input)?;
                            return Ok(true);
                        }
                        self.decoder
                            .queue_input_buffer(input, &self.sample[..size], sample_time, BufferFlags::NONE)?;
                        self.demuxer.advance();
                        Ok(false)
                    }
                }
            }
            Some(other) => {
                trace!(track = other, "Skipping sample from unselected track");
                self.demuxer.advance();
                Ok(false)
            }
            None => match self.decoder.dequeue_input_buffer(self.config.poll_timeout)? {
                Some(input) => {
                    self.queue_end_of_stream(input)?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    fn queue_end_of_stream(&mut self, input: usize) -> Result<(), PipelineError> {
        self.decoder.queue_input_buffer(input, &[], 0, BufferFlags::END_OF_STREAM)
    }

    /// Mux one encoded buffer; returns true on end of stream
    fn drain_encoder_buffer(&mut self, index: usize, info: &BufferInfo) -> Result<bool, DomainError> {
        if info.size > 1 && !info.is_codec_config() {
            let track = self.muxer_track.ok_or_else(|| {
                DomainError::Codec("encoder produced data before its output format".to_string())
            })?;
            let data = self.encoder.output_buffer(index)?;
            let end = info.offset + info.size;
            let payload = data.get(info.offset..end).ok_or_else(|| {
                DomainError::Codec(format!(
                    "encoder buffer {} holds {} bytes, info claims {}..{}",
                    index,
                    data.len(),
                    info.offset,
                    end
                ))
            })?;
            self.muxer.write_sample_data(track, payload, info, false)?;
        }
        self.encoder.release_output_buffer(index)?;
        Ok(info.is_end_of_stream())
    }

    /// Render one decoded frame through the bridge into the encoder
    fn drain_decoder_buffer(
        &mut self,
        index: usize,
        info: &BufferInfo,
        progress: &mut ProgressReporter,
    ) -> Result<(), DomainError> {
        let render = info.size != 0;
        self.decoder.release_output_buffer(index, render)?;
        if !render {
            return Ok(());
        }

        if let Err(err) = self.bridge.await_frame(self.config.frame_timeout) {
            warn!(error = %err, pts = info.presentation_time_us, "Frame never reached the bridge, skipping");
            return Ok(());
        }

        self.bridge.draw_frame()?;
        self.bridge.set_presentation_time(info.presentation_time_us * 1000)?;
        progress.report(self.window.progress_percent(info.presentation_time_us));
        self.bridge.swap_buffers()?;
        Ok(())
    }
}
