//! Audio passthrough: bounded copy of compressed audio samples

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain::errors::DomainError;
use crate::domain::model::TimeWindow;
use crate::engine::{find_track, PumpConfig};
use crate::ports::*;

/// Extra room allocated when a sample outgrows the copy buffer
const BUFFER_HEADROOM: usize = 1024;

/// What the audio pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPass {
    /// No audio track, or audio disabled
    Skipped,
    Copied { samples: usize },
    Cancelled,
}

/// Copy the first audio track's samples in `[window.start_us, window.end_us)` verbatim.
///
/// Every written sample carries the key-frame flag.
pub fn copy_audio(
    demuxer: &mut dyn Demuxer,
    muxer: &mut dyn Muxer,
    window: TimeWindow,
    config: &PumpConfig,
    cancel: &CancellationToken,
) -> Result<AudioPass, DomainError> {
    let Some(track) = find_track(demuxer, TrackFormat::is_audio)? else {
        debug!("Source has no audio track");
        return Ok(AudioPass::Skipped);
    };

    demuxer.select_track(track)?;
    let format = demuxer.track_format(track)?;
    let muxer_track = muxer.add_track(&format, true)?;

    let buffer_size = format
        .max_input_size
        .filter(|size| *size > 0)
        .unwrap_or(config.audio_buffer_size);
    let mut buffer = vec![0u8; buffer_size];

    demuxer.seek_to(window.start_us, config.seek_mode)?;

    let result = copy_samples(demuxer, muxer, track, muxer_track, window, &mut buffer, cancel);
    if let Err(err) = demuxer.unselect_track(track) {
        debug!(error = %err, "Unselecting audio track failed");
    }
    result
}

fn copy_samples(
    demuxer: &mut dyn Demuxer,
    muxer: &mut dyn Muxer,
    track: usize,
    muxer_track: usize,
    window: TimeWindow,
    buffer: &mut Vec<u8>,
    cancel: &CancellationToken,
) -> Result<AudioPass, DomainError> {
    let mut samples = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(AudioPass::Cancelled);
        }

        match demuxer.sample_track_index() {
            None => break,
            Some(current) if current != track => {
                demuxer.advance();
                continue;
            }
            Some(_) => {}
        }

        if let Some(size) = demuxer.sample_size() {
            if size > buffer.len() {
                buffer.resize(size + BUFFER_HEADROOM, 0);
            }
        }

        let Some(size) = demuxer.read_sample_data(buffer)? else {
            break;
        };
        let presentation_time_us = demuxer.sample_time().unwrap_or(i64::MAX);
        if presentation_time_us >= window.end_us {
            trace!(presentation_time_us, "Audio reached window end");
            break;
        }

        let info = BufferInfo {
            offset: 0,
            size,
            presentation_time_us,
            flags: BufferFlags::KEY_FRAME,
        };
        muxer.write_sample_data(muxer_track, &buffer[..size], &info, true)?;
        samples += 1;
        demuxer.advance();
    }

    Ok(AudioPass::Copied { samples })
}
