// Ports - Interface definitions (contracts)

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::*;

/// H.264 / AVC, the single supported output codec.
pub const VIDEO_MIME_AVC: &str = "video/avc";

/// Metadata strings as returned by a platform media retriever.
///
/// Every field is optional and unparsed; the prober decides what is fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub width: Option<String>,
    pub height: Option<String>,
    pub rotation: Option<String>,
    pub bitrate: Option<String>,
    /// Milliseconds
    pub duration_ms: Option<String>,
}

/// Port for reading source metadata
#[async_trait]
pub trait MediaInfoPort: Send + Sync {
    /// Read the raw metadata of a readable source file
    async fn retrieve(&self, path: &Path) -> Result<RawMetadata, DomainError>;
}

/// Opaque caller-side reference to a source video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle(pub String);

impl SourceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceHandle {
    fn from(value: &str) -> Self {
        SourceHandle(value.to_string())
    }
}

impl From<PathBuf> for SourceHandle {
    fn from(value: PathBuf) -> Self {
        SourceHandle(value.to_string_lossy().into_owned())
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port for turning a source handle into a readable, seekable file
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, handle: &SourceHandle) -> Result<PathBuf, DomainError>;
}

/// Port for choosing where working and final outputs live
#[async_trait]
pub trait StorageDestination: Send + Sync {
    /// Return the destination for `name`.
    ///
    /// Working calls (`is_final == false`) return a path the muxer can write to.
    /// The final call persists `source_temp_file` and returns where it ended up.
    async fn create_output(
        &self,
        source_temp_file: &Path,
        name: &str,
        is_final: bool,
    ) -> Result<PathBuf, DomainError>;
}

/// Port for rewriting a container into a progressive-download layout
pub trait StreamFinalizer: Send + Sync {
    /// Returns `Ok(false)` when the input could not be rewritten
    fn rewrite(&self, input: &Path, output: &Path) -> PipelineResult<bool>;
}

/// Caller-facing lifecycle callbacks. All methods default to no-ops.
pub trait CompressionListener: Send + Sync {
    fn on_start(&self, _index: usize) {}
    fn on_progress(&self, _index: usize, _percent: f32) {}
    fn on_success(&self, _index: usize, _size: u64, _path: &Path) {}
    fn on_failure(&self, _index: usize, _message: &str) {}
    fn on_cancelled(&self, _index: usize) {}
}

/// Sample and codec buffer flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

/// Describes one codec output buffer or demuxed sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }
}

/// Result of a non-blocking output poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Nothing ready within the poll timeout
    TryAgainLater,
    /// The output format is now known, see `output_format`
    FormatChanged,
    /// Buffer set was reallocated; carries no data
    BuffersChanged,
    /// A filled output buffer
    Buffer { index: usize, info: BufferInfo },
    /// Any other negative status a codec may report
    Unknown(i32),
}

/// Where the demuxer lands when seeking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    PreviousSync,
    #[default]
    NextSync,
    ClosestSync,
}

/// Track description shared by demuxer, codecs and muxer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub mime: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub i_frame_interval: Option<u32>,
    pub bitrate: Option<u64>,
    pub max_input_size: Option<usize>,
    pub duration_us: Option<i64>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u32>,
    pub color_standard: Option<i32>,
    pub color_transfer: Option<i32>,
    pub color_range: Option<i32>,
}

impl TrackFormat {
    pub fn video(mime: &str, width: u32, height: u32) -> Self {
        Self {
            mime: mime.to_string(),
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn audio(mime: &str, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            mime: mime.to_string(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Self::default()
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }

    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// AVC profiles an encoder may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvcProfile {
    Baseline,
    Main,
    Extended,
    High,
    Other(u32),
}

/// One supported (profile, level) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLevel {
    pub profile: AvcProfile,
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitrateMode {
    Constant,
    Variable,
}

/// Encoder configuration derived from the plan and the source track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub frame_rate: u32,
    pub i_frame_interval: u32,
    pub bitrate_mode: BitrateMode,
    /// Input arrives through a surface rather than byte buffers
    pub surface_input: bool,
    pub color_standard: Option<i32>,
    pub color_transfer: Option<i32>,
    pub color_range: Option<i32>,
    pub profile_level: Option<ProfileLevel>,
}

/// Opaque render target handed between codecs and the frame bridge.
#[derive(Clone)]
pub struct Surface(Arc<dyn Any + Send + Sync>);

impl Surface {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Surface(Arc::new(inner))
    }

    /// Borrow the backend-specific surface, if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Surface(..)")
    }
}

/// Reads compressed samples out of a container
pub trait Demuxer: Send {
    fn track_count(&self) -> usize;
    fn track_format(&self, track: usize) -> PipelineResult<TrackFormat>;
    fn select_track(&mut self, track: usize) -> PipelineResult<()>;
    fn unselect_track(&mut self, track: usize) -> PipelineResult<()>;
    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> PipelineResult<()>;
    /// Track of the current sample, `None` once every selected track is exhausted
    fn sample_track_index(&self) -> Option<usize>;
    fn sample_time(&self) -> Option<i64>;
    fn sample_size(&self) -> Option<usize>;
    /// Copy the current sample into `buf`, returning its size or `None` at end of stream
    fn read_sample_data(&mut self, buf: &mut [u8]) -> PipelineResult<Option<usize>>;
    /// Move to the next sample; false once exhausted
    fn advance(&mut self) -> bool;
    fn release(&mut self);
}

/// Hardware or software video decoder rendering into a surface
pub trait VideoDecoder: Send {
    fn configure(&mut self, format: &TrackFormat, surface: &Surface) -> PipelineResult<()>;
    fn start(&mut self) -> PipelineResult<()>;
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> PipelineResult<Option<usize>>;
    fn queue_input_buffer(
        &mut self,
        index: usize,
        data: &[u8],
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> PipelineResult<()>;
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> PipelineResult<OutputStatus>;
    /// Return a buffer; `render` forwards the frame to the configured surface
    fn release_output_buffer(&mut self, index: usize, render: bool) -> PipelineResult<()>;
    fn stop(&mut self) -> PipelineResult<()>;
    fn release(&mut self);
}

/// Video encoder fed through an input surface
pub trait VideoEncoder: Send {
    fn name(&self) -> &str;
    /// Advertised (profile, level) pairs for the target MIME type
    fn profile_levels(&self) -> Vec<ProfileLevel>;
    fn configure(&mut self, settings: &EncoderSettings) -> PipelineResult<()>;
    fn create_input_surface(&mut self) -> PipelineResult<Surface>;
    fn start(&mut self) -> PipelineResult<()>;
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> PipelineResult<OutputStatus>;
    /// Encoded bytes of a dequeued buffer
    fn output_buffer(&mut self, index: usize) -> PipelineResult<&[u8]>;
    fn output_format(&self) -> PipelineResult<TrackFormat>;
    fn release_output_buffer(&mut self, index: usize) -> PipelineResult<()>;
    fn signal_end_of_input_stream(&mut self) -> PipelineResult<()>;
    fn stop(&mut self) -> PipelineResult<()>;
    fn release(&mut self);
}

/// Copies decoded frames from the decoder surface into the encoder surface
pub trait FrameBridge: Send {
    /// Surface the decoder renders into
    fn output_surface(&self) -> Surface;
    /// Bind the encoder's input surface as the draw target
    fn make_current(&mut self, input: &Surface) -> PipelineResult<()>;
    /// Wait for the decoder's next rendered frame
    fn await_frame(&mut self, timeout: Duration) -> PipelineResult<()>;
    fn draw_frame(&mut self) -> PipelineResult<()>;
    fn set_presentation_time(&mut self, nanos: i64) -> PipelineResult<()>;
    /// Submit the drawn frame to the encoder
    fn swap_buffers(&mut self) -> PipelineResult<()>;
    fn release(&mut self);
}

/// Writes samples of one or more tracks into a container
pub trait Muxer: Send {
    fn add_track(&mut self, format: &TrackFormat, is_audio: bool) -> PipelineResult<usize>;
    fn write_sample_data(
        &mut self,
        track: usize,
        data: &[u8],
        info: &BufferInfo,
        is_audio: bool,
    ) -> PipelineResult<()>;
    fn finish(&mut self) -> PipelineResult<()>;
}

/// Factory for the per-item codec, bridge and container components
pub trait CodecBackend: Send + Sync {
    fn open_demuxer(&self, source: &Path) -> PipelineResult<Box<dyn Demuxer>>;
    fn create_decoder(&self, mime: &str) -> PipelineResult<Box<dyn VideoDecoder>>;
    /// Whether a preferred hardware encoder is available for `mime`
    fn has_preferred_encoder(&self, mime: &str) -> bool;
    fn create_encoder(&self, mime: &str, preferred: bool) -> PipelineResult<Box<dyn VideoEncoder>>;
    fn create_frame_bridge(&self) -> PipelineResult<Box<dyn FrameBridge>>;
    /// Muxer writing to `output`, tagging the video with `rotation` degrees
    fn create_muxer(&self, output: &Path, rotation: u32) -> PipelineResult<Box<dyn Muxer>>;
}
