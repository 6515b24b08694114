// Mock codec adapter - In-memory codec backend with scripted tracks

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::*;
use crate::ports::*;

/// Decoder input slots available before the mock applies back-pressure
const DECODER_SLOTS: usize = 4;
/// Size of the codec-config buffer emitted before the first frame
const CODEC_CONFIG_SIZE: usize = 24;

/// One compressed sample of a scripted track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedSample {
    pub pts_us: i64,
    pub size: usize,
    pub key_frame: bool,
}

/// A track served by [`MockCodecBackend`]'s demuxer
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedTrack {
    pub format: TrackFormat,
    pub samples: Vec<ScriptedSample>,
}

impl ScriptedTrack {
    /// Constant frame rate AVC track with one key frame per second
    pub fn video(width: u32, height: u32, fps: u32, duration_us: i64) -> Self {
        let fps = fps.max(1);
        let step = 1_000_000 / i64::from(fps);
        let samples = (0..)
            .map(|i| i * step)
            .take_while(|pts| *pts < duration_us)
            .enumerate()
            .map(|(i, pts_us)| ScriptedSample {
                pts_us,
                size: 1_000,
                key_frame: i % fps as usize == 0,
            })
            .collect();

        let mut format = TrackFormat::video(VIDEO_MIME_AVC, width, height);
        format.frame_rate = Some(fps);
        format.duration_us = Some(duration_us);
        format.max_input_size = Some(4_096);
        Self { format, samples }
    }

    /// AAC track with 1024-sample frames at 44.1 kHz
    pub fn audio(duration_us: i64) -> Self {
        let samples = (0..)
            .map(|i: i64| i * 1024 * 1_000_000 / 44_100)
            .take_while(|pts| *pts < duration_us)
            .map(|pts_us| ScriptedSample { pts_us, size: 200, key_frame: true })
            .collect();

        let mut format = TrackFormat::audio("audio/mp4a-latm", 44_100, 2);
        format.duration_us = Some(duration_us);
        Self { format, samples }
    }

    pub fn with_max_input_size(mut self, size: Option<usize>) -> Self {
        self.format.max_input_size = size;
        self
    }
}

/// Failures the mock can be told to produce
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    pub fail_open_demuxer: bool,
    pub panic_on_open_demuxer: bool,
    pub fail_preferred_configure: bool,
    pub fail_default_configure: bool,
    pub fail_create_decoder: bool,
    /// `(frames, code)`: report status `code` once `frames` frames were encoded
    pub encoder_unknown_status_after: Option<(usize, i32)>,
    pub decoder_unknown_status_after: Option<(usize, i32)>,
    /// Encoder stops producing output after this many frames
    pub stall_encoder_after: Option<usize>,
    /// Presentation times whose frames never reach the bridge
    pub dropped_frames: Vec<i64>,
    pub fail_muxer_finish: bool,
}

/// A sample written to a mock muxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxedSample {
    pub output: PathBuf,
    pub track: usize,
    pub is_audio: bool,
    pub pts_us: i64,
    pub size: usize,
    pub flags: BufferFlags,
}

/// Creation and release counters shared by every component of one backend
#[derive(Debug, Default)]
pub struct MockStats {
    pub demuxers_opened: AtomicUsize,
    pub demuxers_released: AtomicUsize,
    pub decoders_created: AtomicUsize,
    pub decoders_released: AtomicUsize,
    pub encoders_created: AtomicUsize,
    pub encoders_released: AtomicUsize,
    pub preferred_encoders_created: AtomicUsize,
    pub bridges_created: AtomicUsize,
    pub bridges_released: AtomicUsize,
    pub muxers_created: AtomicUsize,
    pub muxers_finished: AtomicUsize,
    pub frames_encoded: AtomicUsize,
    muxed: Mutex<Vec<MuxedSample>>,
    configured: Mutex<Vec<EncoderSettings>>,
}

impl MockStats {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Every created component has been released exactly as often as created
    pub fn all_released(&self) -> bool {
        let pairs = [
            (&self.demuxers_opened, &self.demuxers_released),
            (&self.decoders_created, &self.decoders_released),
            (&self.encoders_created, &self.encoders_released),
            (&self.bridges_created, &self.bridges_released),
        ];
        pairs.iter().all(|(created, released)| Self::count(created) == Self::count(released))
    }

    pub fn muxed(&self) -> Vec<MuxedSample> {
        lock(&self.muxed).clone()
    }

    pub fn configured_settings(&self) -> Vec<EncoderSettings> {
        lock(&self.configured).clone()
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Codec backend whose demuxer serves the same scripted tracks for every source
pub struct MockCodecBackend {
    tracks: Vec<ScriptedTrack>,
    faults: MockFaults,
    preferred_encoder: bool,
    profile_levels: Vec<ProfileLevel>,
    stats: Arc<MockStats>,
}

impl MockCodecBackend {
    pub fn new(tracks: Vec<ScriptedTrack>) -> Self {
        Self {
            tracks,
            faults: MockFaults::default(),
            preferred_encoder: false,
            profile_levels: vec![
                ProfileLevel { profile: AvcProfile::Baseline, level: 31 },
                ProfileLevel { profile: AvcProfile::Main, level: 40 },
            ],
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Video track plus audio track of the same duration
    pub fn with_av(width: u32, height: u32, duration_us: i64) -> Self {
        Self::new(vec![
            ScriptedTrack::video(width, height, 30, duration_us),
            ScriptedTrack::audio(duration_us),
        ])
    }

    pub fn with_faults(mut self, faults: MockFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_preferred_encoder(mut self, available: bool) -> Self {
        self.preferred_encoder = available;
        self
    }

    pub fn with_profile_levels(mut self, levels: Vec<ProfileLevel>) -> Self {
        self.profile_levels = levels;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl CodecBackend for MockCodecBackend {
    fn open_demuxer(&self, source: &Path) -> PipelineResult<Box<dyn Demuxer>> {
        if self.faults.panic_on_open_demuxer {
            panic!("mock demuxer exploded on {}", source.display());
        }
        if self.faults.fail_open_demuxer {
            return Err(PipelineError::Container(format!("cannot open {}", source.display())));
        }
        MockStats::bump(&self.stats.demuxers_opened);
        Ok(Box::new(MockDemuxer {
            cursors: vec![0; self.tracks.len()],
            selected: vec![false; self.tracks.len()],
            tracks: self.tracks.clone(),
            stats: self.stats.clone(),
            released: false,
        }))
    }

    fn create_decoder(&self, mime: &str) -> PipelineResult<Box<dyn VideoDecoder>> {
        if self.faults.fail_create_decoder {
            return Err(PipelineError::Codec(format!("no decoder for {}", mime)));
        }
        MockStats::bump(&self.stats.decoders_created);
        Ok(Box::new(MockDecoder {
            stats: self.stats.clone(),
            unknown_after: self.faults.decoder_unknown_status_after,
            frames: None,
            pending: VecDeque::new(),
            held: HashMap::new(),
            next_index: 0,
            outputs: 0,
            started: false,
            released: false,
        }))
    }

    fn has_preferred_encoder(&self, _mime: &str) -> bool {
        self.preferred_encoder
    }

    fn create_encoder(&self, mime: &str, preferred: bool) -> PipelineResult<Box<dyn VideoEncoder>> {
        MockStats::bump(&self.stats.encoders_created);
        if preferred {
            MockStats::bump(&self.stats.preferred_encoders_created);
        }
        let name = if preferred { "mock.hw.avc.encoder" } else { "mock.avc.encoder" };
        Ok(Box::new(MockEncoder {
            name: format!("{} ({})", name, mime),
            preferred,
            faults: self.faults.clone(),
            levels: self.profile_levels.clone(),
            stats: self.stats.clone(),
            input: Arc::new(Mutex::new(EncoderInput::default())),
            settings: None,
            started: false,
            format_sent: false,
            config_sent: false,
            eos_sent: false,
            frames_out: 0,
            held: HashMap::new(),
            next_index: 0,
            released: false,
        }))
    }

    fn create_frame_bridge(&self) -> PipelineResult<Box<dyn FrameBridge>> {
        MockStats::bump(&self.stats.bridges_created);
        Ok(Box::new(MockBridge {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            target: None,
            current: None,
            drawn: false,
            pts_ns: None,
            dropped: self.faults.dropped_frames.clone(),
            stats: self.stats.clone(),
            released: false,
        }))
    }

    fn create_muxer(&self, output: &Path, _rotation: u32) -> PipelineResult<Box<dyn Muxer>> {
        let file = File::create(output)?;
        MockStats::bump(&self.stats.muxers_created);
        Ok(Box::new(MockMuxer {
            output: output.to_path_buf(),
            file,
            tracks: Vec::new(),
            fail_finish: self.faults.fail_muxer_finish,
            stats: self.stats.clone(),
        }))
    }
}

type FrameQueue = Arc<Mutex<VecDeque<i64>>>;

#[derive(Debug, Default)]
struct EncoderInput {
    frames: VecDeque<i64>,
    end_of_input: bool,
}

enum MockSurface {
    Decoder(FrameQueue),
    Encoder(Arc<Mutex<EncoderInput>>),
}

struct MockDemuxer {
    tracks: Vec<ScriptedTrack>,
    selected: Vec<bool>,
    cursors: Vec<usize>,
    stats: Arc<MockStats>,
    released: bool,
}

impl MockDemuxer {
    fn check_track(&self, track: usize) -> PipelineResult<()> {
        if track < self.tracks.len() {
            Ok(())
        } else {
            Err(PipelineError::Container(format!("no track {}", track)))
        }
    }

    /// Selected track whose next sample has the lowest timestamp
    fn current(&self) -> Option<(usize, ScriptedSample)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(i, _)| self.selected[*i])
            .filter_map(|(i, t)| t.samples.get(self.cursors[i]).map(|s| (i, *s)))
            .min_by_key(|(_, s)| s.pts_us)
    }
}

impl Demuxer for MockDemuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, track: usize) -> PipelineResult<TrackFormat> {
        self.check_track(track)?;
        Ok(self.tracks[track].format.clone())
    }

    fn select_track(&mut self, track: usize) -> PipelineResult<()> {
        self.check_track(track)?;
        self.selected[track] = true;
        Ok(())
    }

    fn unselect_track(&mut self, track: usize) -> PipelineResult<()> {
        self.check_track(track)?;
        self.selected[track] = false;
        Ok(())
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> PipelineResult<()> {
        for (i, track) in self.tracks.iter().enumerate() {
            if !self.selected[i] {
                continue;
            }
            let keys: Vec<(usize, i64)> = track
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.key_frame)
                .map(|(n, s)| (n, s.pts_us))
                .collect();
            let next = keys.iter().find(|(_, pts)| *pts >= time_us).copied();
            let previous = keys.iter().rev().find(|(_, pts)| *pts <= time_us).copied();
            let target = match mode {
                SeekMode::NextSync => next,
                SeekMode::PreviousSync => previous.or(next),
                SeekMode::ClosestSync => match (previous, next) {
                    (Some(p), Some(n)) => Some(if time_us - p.1 <= n.1 - time_us { p } else { n }),
                    (p, n) => p.or(n),
                },
            };
            self.cursors[i] = target.map(|(n, _)| n).unwrap_or(track.samples.len());
        }
        Ok(())
    }

    fn sample_track_index(&self) -> Option<usize> {
        self.current().map(|(track, _)| track)
    }

    fn sample_time(&self) -> Option<i64> {
        self.current().map(|(_, s)| s.pts_us)
    }

    fn sample_size(&self) -> Option<usize> {
        self.current().map(|(_, s)| s.size)
    }


    fn read_sample_data(&mut self, buf: &mut [u8]) -> PipelineResult<Option<usize>> {
        let Some((_, sample)) = self.current() else {
            return Ok(None);
        };
        let len = buf.len();
        let target = buf.get_mut(..sample.size).ok_or_else(|| {
            PipelineError::Container(format!("buffer of {} bytes too small for {}", len, sample.size))
        })?;
        target.fill((sample.pts_us / 1_000 % 251) as u8);
        Ok(Some(sample.size))
    }

    fn advance(&mut self) -> bool {
        match self.current() {
            Some((track, _)) => {
                self.cursors[track] += 1;
                self.current().is_some()
            }
            None => false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            MockStats::bump(&self.stats.demuxers_released);
        }
    }
}

struct MockDecoder {
    stats: Arc<MockStats>,
    unknown_after: Option<(usize, i32)>,
    frames: Option<FrameQueue>,
    pending: VecDeque<BufferInfo>,
    held: HashMap<usize, BufferInfo>,
    next_index: usize,
    outputs: usize,
    started: bool,
    released: bool,
}

impl VideoDecoder for MockDecoder {
    fn configure(&mut self, format: &TrackFormat, surface: &Surface) -> PipelineResult<()> {
        if !format.is_video() {
            return Err(PipelineError::Codec(format!("cannot decode {}", format.mime)));
        }
        match surface.downcast_ref::<MockSurface>() {
            Some(MockSurface::Decoder(frames)) => {
                self.frames = Some(frames.clone());
                Ok(())
            }
            _ => Err(PipelineError::Surface("decoder needs the bridge output surface".to_string())),
        }
    }

    fn start(&mut self) -> PipelineResult<()> {
        if self.frames.is_none() {
            return Err(PipelineError::Codec("decoder started before configure".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> PipelineResult<Option<usize>> {
        if !self.started {
            return Err(PipelineError::Codec("decoder not started".to_string()));
        }
        Ok((self.pending.len() < DECODER_SLOTS).then_some(0))
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        data: &[u8],
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> PipelineResult<()> {
        self.pending.push_back(BufferInfo {
            offset: 0,
            size: data.len(),
            presentation_time_us,
            flags,
        });
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> PipelineResult<OutputStatus> {
        if let Some((after, code)) = self.unknown_after {
            if self.outputs >= after {
                return Ok(OutputStatus::Unknown(code));
            }
        }
        match self.pending.pop_front() {
            Some(info) => {
                let index = self.next_index;
                self.next_index += 1;
                self.outputs += 1;
                self.held.insert(index, info);
                Ok(OutputStatus::Buffer { index, info })
            }
            None => Ok(OutputStatus::TryAgainLater),
        }
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> PipelineResult<()> {
        let info = self
            .held
            .remove(&index)
            .ok_or_else(|| PipelineError::Codec(format!("decoder buffer {} not held", index)))?;
        if render {
            if let Some(frames) = &self.frames {
                lock(frames).push_back(info.presentation_time_us);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.started = false;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            MockStats::bump(&self.stats.decoders_released);
        }
    }
}

struct MockEncoder {
    name: String,
    preferred: bool,
    faults: MockFaults,
    levels: Vec<ProfileLevel>,
    stats: Arc<MockStats>,
    input: Arc<Mutex<EncoderInput>>,
    settings: Option<EncoderSettings>,
    started: bool,
    format_sent: bool,
    config_sent: bool,
    eos_sent: bool,
    frames_out: usize,
    held: HashMap<usize, Vec<u8>>,
    next_index: usize,
    released: bool,
}

impl MockEncoder {
    fn emit(&mut self, size: usize, presentation_time_us: i64, flags: BufferFlags) -> OutputStatus {
        let index = self.next_index;
        self.next_index += 1;
        self.held.insert(index, vec![0xAB; size]);
        OutputStatus::Buffer {
            index,
            info: BufferInfo { offset: 0, size, presentation_time_us, flags },
        }
    }

    fn frame_size(&self) -> usize {
        self.settings
            .as_ref()
            .map(|s| (s.bitrate / 8 / u64::from(s.frame_rate.max(1))) as usize)
            .unwrap_or(0)
            .clamp(2, 64 * 1024)
    }
}

impl VideoEncoder for MockEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile_levels(&self) -> Vec<ProfileLevel> {
        self.levels.clone()
    }

    fn configure(&mut self, settings: &EncoderSettings) -> PipelineResult<()> {
        let rejected = if self.preferred {
            self.faults.fail_preferred_configure
        } else {
            self.faults.fail_default_configure
        };
        if rejected {
            return Err(PipelineError::Codec(format!("{} rejected configuration", self.name)));
        }
        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            return Err(PipelineError::Codec(format!(
                "odd dimensions {}x{}",
                settings.width, settings.height
            )));
        }
        lock(&self.stats.configured).push(settings.clone());
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> PipelineResult<Surface> {
        if self.settings.is_none() {
            return Err(PipelineError::Surface("encoder not configured".to_string()));
        }
        Ok(Surface::new(MockSurface::Encoder(self.input.clone())))
    }

    fn start(&mut self) -> PipelineResult<()> {
        self.started = true;
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> PipelineResult<OutputStatus> {
        if !self.started {
            return Err(PipelineError::Codec("encoder not started".to_string()));
        }
        if let Some((after, code)) = self.faults.encoder_unknown_status_after {
            if self.frames_out >= after {
                return Ok(OutputStatus::Unknown(code));
            }
        }
        if matches!(self.faults.stall_encoder_after, Some(after) if self.frames_out >= after) {
            return Ok(OutputStatus::TryAgainLater);
        }
        if !self.format_sent {
            self.format_sent = true;
            return Ok(OutputStatus::FormatChanged);
        }
        if !self.config_sent {
            self.config_sent = true;
            return Ok(self.emit(CODEC_CONFIG_SIZE, 0, BufferFlags::CODEC_CONFIG));
        }

        let (next, end_of_input) = {
            let mut input = lock(&self.input);
            (input.frames.pop_front(), input.end_of_input)
        };
        match next {
            Some(pts) => {
                self.frames_out += 1;
                MockStats::bump(&self.stats.frames_encoded);
                let size = self.frame_size();
                Ok(self.emit(size, pts, BufferFlags::KEY_FRAME))
            }
            None if end_of_input && !self.eos_sent => {
                self.eos_sent = true;
                Ok(self.emit(0, 0, BufferFlags::END_OF_STREAM))
            }
            None => Ok(OutputStatus::TryAgainLater),
        }
    }

    fn output_buffer(&mut self, index: usize) -> PipelineResult<&[u8]> {
        self.held
            .get(&index)
            .map(Vec::as_slice)
            .ok_or_else(|| PipelineError::Codec(format!("encoder buffer {} not held", index)))
    }

    fn output_format(&self) -> PipelineResult<TrackFormat> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| PipelineError::Codec("encoder not configured".to_string()))?;
        let mut format = TrackFormat::video(&settings.mime, settings.width, settings.height);
        format.bitrate = Some(settings.bitrate);
        format.frame_rate = Some(settings.frame_rate);
        Ok(format)
    }

    fn release_output_buffer(&mut self, index: usize) -> PipelineResult<()> {
        self.held
            .remove(&index)
            .map(|_| ())
            .ok_or_else(|| PipelineError::Codec(format!("encoder buffer {} not held", index)))
    }

    fn signal_end_of_input_stream(&mut self) -> PipelineResult<()> {
        lock(&self.input).end_of_input = true;
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.started = false;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            MockStats::bump(&self.stats.encoders_released);
        }
    }
}

struct MockBridge {
    frames: FrameQueue,
    target: Option<Arc<Mutex<EncoderInput>>>,
    current: Option<i64>,
    drawn: bool,
    pts_ns: Option<i64>,
    dropped: Vec<i64>,
    stats: Arc<MockStats>,
    released: bool,
}

impl FrameBridge for MockBridge {
    fn output_surface(&self) -> Surface {
        Surface::new(MockSurface::Decoder(self.frames.clone()))
    }

    fn make_current(&mut self, input: &Surface) -> PipelineResult<()> {
        match input.downcast_ref::<MockSurface>() {
            Some(MockSurface::Encoder(target)) => {
                self.target = Some(target.clone());
                Ok(())
            }
            _ => Err(PipelineError::Surface("not an encoder input surface".to_string())),
        }
    }

    fn await_frame(&mut self, timeout: Duration) -> PipelineResult<()> {
        let pts = lock(&self.frames)
            .pop_front()
            .ok_or(PipelineError::FrameTimeout(timeout))?;
        if self.dropped.contains(&pts) {
            return Err(PipelineError::Surface(format!("frame at {}us was lost", pts)));
        }
        self.current = Some(pts);
        self.drawn = false;
        Ok(())
    }

    fn draw_frame(&mut self) -> PipelineResult<()> {
        if self.current.is_none() {
            return Err(PipelineError::Surface("no frame to draw".to_string()));
        }
        self.drawn = true;
        Ok(())
    }

    fn set_presentation_time(&mut self, nanos: i64) -> PipelineResult<()> {
        self.pts_ns = Some(nanos);
        Ok(())
    }

    fn swap_buffers(&mut self) -> PipelineResult<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| PipelineError::Surface("no current encoder surface".to_string()))?;
        if !self.drawn {
            return Err(PipelineError::Surface("swap before draw".to_string()));
        }
        let nanos = self
            .pts_ns
            .take()
            .ok_or_else(|| PipelineError::Surface("presentation time not set".to_string()))?;
        lock(target).frames.push_back(nanos / 1_000);
        self.current = None;
        self.drawn = false;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            MockStats::bump(&self.stats.bridges_released);
        }
    }
}

struct MockMuxer {
    output: PathBuf,
    file: File,
    tracks: Vec<(TrackFormat, bool)>,
    fail_finish: bool,
    stats: Arc<MockStats>,
}

impl Muxer for MockMuxer {
    fn add_track(&mut self, format: &TrackFormat, is_audio: bool) -> PipelineResult<usize> {
        self.tracks.push((format.clone(), is_audio));
        Ok(self.tracks.len() - 1)
    }

    fn write_sample_data(
        &mut self,
        track: usize,
        data: &[u8],
        info: &BufferInfo,
        is_audio: bool,
    ) -> PipelineResult<()> {
        match self.tracks.get(track) {
            Some((_, audio)) if *audio == is_audio => {}
            _ => return Err(PipelineError::Container(format!("bad track {} (audio: {})", track, is_audio))),
        }
        self.file.write_all(data)?;
        lock(&self.stats.muxed).push(MuxedSample {
            output: self.output.clone(),
            track,
            is_audio,
            pts_us: info.presentation_time_us,
            size: data.len(),
            flags: info.flags,
        });
        Ok(())
    }

    fn finish(&mut self) -> PipelineResult<()> {
        if self.fail_finish {
            return Err(PipelineError::Container("mock muxer failed to write the index".to_string()));
        }
        self.file.write_all(b"MOCKINDEX")?;
        self.file.flush()?;
        MockStats::bump(&self.stats.muxers_finished);
        Ok(())
    }
}

/// Media info port answering from a fixed table
#[derive(Debug, Clone, Default)]
pub struct ScriptedMediaInfo {
    default: Option<RawMetadata>,
    by_path: HashMap<PathBuf, RawMetadata>,
}

impl ScriptedMediaInfo {
    /// Same metadata for every source
    pub fn fixed(width: u32, height: u32, rotation: u32, bitrate: u64, duration_ms: u64) -> Self {
        Self {
            default: Some(RawMetadata {
                width: Some(width.to_string()),
                height: Some(height.to_string()),
                rotation: Some(rotation.to_string()),
                bitrate: Some(bitrate.to_string()),
                duration_ms: Some(duration_ms.to_string()),
            }),
            by_path: HashMap::new(),
        }
    }

    /// Same raw strings for every source
    pub fn from_raw(raw: RawMetadata) -> Self {
        Self { default: Some(raw), by_path: HashMap::new() }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>, raw: RawMetadata) -> Self {
        self.by_path.insert(path.into(), raw);
        self
    }
}

#[async_trait]
impl MediaInfoPort for ScriptedMediaInfo {
    async fn retrieve(&self, path: &Path) -> Result<RawMetadata, DomainError> {
        self.by_path
            .get(path)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| DomainError::MetadataUnavailable(format!("no metadata for {}", path.display())))
    }
}
