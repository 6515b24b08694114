// Domain models - Core types and data structures

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Microseconds per second, the demuxer/codec timestamp unit.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Compression quality tier. Ordered from smallest to largest output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl VideoQuality {
    /// All tiers in ascending order.
    pub const ALL: [VideoQuality; 5] = [
        VideoQuality::VeryLow,
        VideoQuality::Low,
        VideoQuality::Medium,
        VideoQuality::High,
        VideoQuality::VeryHigh,
    ];

    /// Fraction of the source bitrate kept by this tier
    pub fn bitrate_multiplier(self) -> f64 {
        match self {
            VideoQuality::VeryLow => 0.1,
            VideoQuality::Low => 0.2,
            VideoQuality::Medium => 0.3,
            VideoQuality::High => 0.4,
            VideoQuality::VeryHigh => 0.6,
        }
    }

    /// The next lower tier, saturating at `VeryLow`
    pub fn lower(self) -> Self {
        match self {
            VideoQuality::VeryLow | VideoQuality::Low => VideoQuality::VeryLow,
            VideoQuality::Medium => VideoQuality::Low,
            VideoQuality::High => VideoQuality::Medium,
            VideoQuality::VeryHigh => VideoQuality::High,
        }
    }

    /// Parse a tier name such as `medium`, `very-high` or `VERY_LOW`
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "very_low" => Ok(VideoQuality::VeryLow),
            "low" => Ok(VideoQuality::Low),
            "medium" => Ok(VideoQuality::Medium),
            "high" => Ok(VideoQuality::High),
            "very_high" => Ok(VideoQuality::VeryHigh),
            _ => Err(DomainError::BadArgs(format!(
                "Invalid quality: {}. Valid values: very_low, low, medium, high, very_high",
                value
            ))),
        }
    }
}

impl Default for VideoQuality {
    fn default() -> Self {
        VideoQuality::VeryHigh
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoQuality::VeryLow => "very_low",
            VideoQuality::Low => "low",
            VideoQuality::Medium => "medium",
            VideoQuality::High => "high",
            VideoQuality::VeryHigh => "very_high",
        };
        f.write_str(name)
    }
}

/// Strategy for deriving target dimensions from source dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Scale factor picked from the larger source axis
    Automatic,
    /// Multiply both axes by a fixed fraction
    Scale { factor: f64 },
    /// Shrink to fit inside the limits, keeping aspect ratio
    LimitDimension { max_width: f64, max_height: f64 },
    /// Fit to the target box, or stretch to it exactly
    MatchDimension { width: f64, height: f64, stretch: bool },
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy::Automatic
    }
}

impl ResizePolicy {
    /// Same limit on both axes
    pub fn limit_size(limit: f64) -> Self {
        ResizePolicy::LimitDimension { max_width: limit, max_height: limit }
    }

    /// Square target box
    pub fn match_size(size: f64, stretch: bool) -> Self {
        ResizePolicy::MatchDimension { width: size, height: size, stretch }
    }
}

/// Per-batch compression configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub quality: VideoQuality,
    pub min_bitrate_check: bool,
    /// Explicit target bitrate in Mbps, overriding the quality multiplier
    pub video_bitrate_mbps: Option<u32>,
    pub disable_audio: bool,
    /// `None` keeps the source resolution
    pub resizer: Option<ResizePolicy>,
    /// Clip start in whole seconds
    pub start_time: Option<u32>,
    /// Clip end in whole seconds
    pub end_time: Option<u32>,
    /// Upper bound on the estimated output size in MiB
    pub max_size_mb: Option<u32>,
    /// Output names, one per source item
    pub video_names: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            quality: VideoQuality::default(),
            min_bitrate_check: true,
            video_bitrate_mbps: None,
            disable_audio: false,
            resizer: Some(ResizePolicy::Automatic),
            start_time: None,
            end_time: None,
            max_size_mb: None,
            video_names: Vec::new(),
        }
    }
}

impl Configuration {
    /// Check the parts of the configuration that do not depend on the source
    pub fn validate(&self, source_count: usize) -> Result<(), DomainError> {
        if self.video_names.len() != source_count {
            return Err(DomainError::BadArgs(format!(
                "{} video names given for {} source items",
                self.video_names.len(),
                source_count
            )));
        }

        if let Some(name) = self.video_names.iter().find(|n| n.trim().is_empty()) {
            return Err(DomainError::BadArgs(format!("Invalid video name: {:?}", name)));
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                return Err(DomainError::InvalidTimeRange(format!(
                    "start ({}s) must be before end ({}s)",
                    start, end
                )));
            }
        }

        if let Some(ResizePolicy::Scale { factor }) = self.resizer {
            if !(factor > 0.0 && factor.is_finite()) {
                return Err(DomainError::BadArgs(format!("Invalid scale factor: {}", factor)));
            }
        }

        Ok(())
    }
}

/// Source properties read by the metadata prober.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub width: f64,
    pub height: f64,
    /// Degrees, one of 0, 90, 180, 270
    pub rotation: u32,
    /// Bits per second
    pub bitrate: u64,
    /// Microseconds
    pub duration_us: i64,
}

/// Clip boundaries in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_us: i64,
    pub end_us: i64,
    /// Window length rounded to whole seconds, expressed in microseconds
    pub clipped_duration_us: i64,
}

impl TimeWindow {
    /// Derive the window from second-granularity bounds and the source duration.
    ///
    /// The end is clamped to the source duration; an empty or inverted window
    /// is rejected.
    pub fn from_seconds(
        start: Option<u32>,
        end: Option<u32>,
        source_duration_us: i64,
    ) -> Result<Self, DomainError> {
        let start_us = i64::from(start.unwrap_or(0)) * MICROS_PER_SECOND;
        let end_us = match end {
            Some(end) => (i64::from(end) * MICROS_PER_SECOND).min(source_duration_us),
            None => source_duration_us,
        };

        if start_us >= end_us {
            return Err(DomainError::InvalidTimeRange(format!(
                "start ({}us) must be before end ({}us, source duration {}us)",
                start_us, end_us, source_duration_us
            )));
        }

        let rounded_seconds = ((end_us - start_us) as f64 / MICROS_PER_SECOND as f64).round() as i64;

        Ok(Self {
            start_us,
            end_us,
            clipped_duration_us: rounded_seconds * MICROS_PER_SECOND,
        })
    }

    /// Exact window length
    pub fn exact_duration_us(&self) -> i64 {
        self.end_us - self.start_us
    }

    /// Rounded window length in whole seconds
    pub fn clipped_seconds(&self) -> u64 {
        (self.clipped_duration_us / MICROS_PER_SECOND) as u64
    }

    /// Percentage of the window covered at `presentation_time_us`, in 0..=100
    pub fn progress_percent(&self, presentation_time_us: i64) -> f32 {
        let duration = if self.clipped_duration_us > 0 {
            self.clipped_duration_us
        } else {
            self.exact_duration_us()
        };
        let percent = (presentation_time_us - self.start_us) as f64 / duration as f64 * 100.0;
        percent.clamp(0.0, 100.0) as f32
    }
}

/// Everything the pump needs to know about the target stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingPlan {
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bitrate: u64,
    /// Always 0: rotation is burned into the dimensions
    pub rotation: u32,
    pub quality: VideoQuality,
    pub window: TimeWindow,
}

impl EncodingPlan {
    /// Estimated output size in MiB for the rounded clip duration
    pub fn estimated_size_mb(&self) -> u64 {
        crate::domain::rules::BitratePlanner::estimate_compressed_size_mb(
            self.bitrate,
            self.window.clipped_seconds(),
        )
    }
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobResult {
    Success { path: PathBuf, size: u64 },
    Failure { message: String },
    Cancelled,
}

impl JobResult {
    pub fn failure(message: impl Into<String>) -> Self {
        JobResult::Failure { message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

impl From<DomainError> for JobResult {
    fn from(err: DomainError) -> Self {
        JobResult::Failure { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests;
