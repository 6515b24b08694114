// Domain rules - Business logic and policies

use crate::domain::errors::*;
use crate::domain::model::*;

/// Source bitrates at or below this floor are not worth compressing.
pub const MIN_SOURCE_BITRATE: u64 = 2_000_000;

const BITS_PER_MEBIBYTE: f64 = 8.0 * 1024.0 * 1024.0;

impl ResizePolicy {
    /// Map source dimensions to target dimensions, rounded to even integers
    pub fn resize(&self, width: f64, height: f64) -> (u32, u32) {
        let (w, h) = self.resize_raw(width, height);
        (round_even(w), round_even(h))
    }

    /// Unrounded target dimensions
    pub fn resize_raw(&self, width: f64, height: f64) -> (f64, f64) {
        match *self {
            ResizePolicy::Automatic => {
                let factor = auto_scale_factor(width, height);
                (width * factor, height * factor)
            }
            ResizePolicy::Scale { factor } => (width * factor, height * factor),
            ResizePolicy::LimitDimension { max_width, max_height } => {
                if width < max_width && height < max_height {
                    (width, height)
                } else {
                    fit_keeping_aspect(width, height, max_width, max_height)
                }
            }
            ResizePolicy::MatchDimension { width: target_w, height: target_h, stretch } => {
                if stretch {
                    (target_w, target_h)
                } else {
                    fit_keeping_aspect(width, height, target_w, target_h)
                }
            }
        }
    }
}

/// Scale factor used by [`ResizePolicy::Automatic`]
pub fn auto_scale_factor(width: f64, height: f64) -> f64 {
    if width >= 1920.0 || height >= 1920.0 {
        0.5
    } else if width >= 1280.0 || height >= 1280.0 {
        0.75
    } else if width >= 960.0 || height >= 960.0 {
        0.95
    } else {
        0.9
    }
}

/// Largest box with the source aspect ratio that fits inside `box_w` x `box_h`
fn fit_keeping_aspect(width: f64, height: f64, box_w: f64, box_h: f64) -> (f64, f64) {
    let desired_aspect = width / height;
    let box_aspect = box_w / box_h;
    if box_aspect <= desired_aspect {
        (box_w, box_w / desired_aspect)
    } else {
        (box_h * desired_aspect, box_h)
    }
}

/// Round to the nearest even non-negative integer
pub fn round_even(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    ((value / 2.0).round() * 2.0).min(u32::MAX as f64) as u32
}

/// Target bitrate selection.
#[derive(Debug, Clone, Copy)]
pub struct BitratePlanner {
    pub min_source_bitrate: u64,
}

impl Default for BitratePlanner {
    fn default() -> Self {
        Self { min_source_bitrate: MIN_SOURCE_BITRATE }
    }
}

impl BitratePlanner {
    pub fn new(min_source_bitrate: u64) -> Self {
        Self { min_source_bitrate }
    }

    /// Compute the target bitrate in bits per second.
    ///
    /// An explicit Mbps override wins and skips the floor check.
    pub fn plan(
        &self,
        source_bitrate: u64,
        quality: VideoQuality,
        explicit_mbps: Option<u32>,
        min_check: bool,
    ) -> Result<u64, DomainError> {
        if let Some(mbps) = explicit_mbps {
            return Ok(u64::from(mbps) * 1_000_000);
        }

        if min_check && source_bitrate <= self.min_source_bitrate {
            return Err(DomainError::InsufficientSourceBitrate {
                source_bitrate,
                floor: self.min_source_bitrate,
            });
        }

        Ok(Self::apply_quality(source_bitrate, quality))
    }

    /// `round(source_bitrate * multiplier)`
    pub fn apply_quality(source_bitrate: u64, quality: VideoQuality) -> u64 {
        (source_bitrate as f64 * quality.bitrate_multiplier()).round() as u64
    }

    /// Estimated output size in MiB, rounded to the nearest integer
    pub fn estimate_compressed_size_mb(bitrate: u64, duration_seconds: u64) -> u64 {
        (bitrate as f64 * duration_seconds as f64 / BITS_PER_MEBIBYTE).round() as u64
    }

    /// Step the quality down one tier at a time until the estimate fits `max_size_mb`
    pub fn fit_quality_to_size(
        source_bitrate: u64,
        quality: VideoQuality,
        duration_seconds: u64,
        max_size_mb: u32,
    ) -> VideoQuality {
        let mut current = quality;
        loop {
            let estimate = Self::estimate_compressed_size_mb(
                Self::apply_quality(source_bitrate, current),
                duration_seconds,
            );
            if estimate <= u64::from(max_size_mb) || current == VideoQuality::VeryLow {
                return current;
            }
            current = current.lower();
        }
    }
}

/// Normalize rotation into the encoded dimensions.
///
/// 90 and 270 swap width and height; every result carries rotation 0.
pub fn normalize_rotation(width: u32, height: u32, rotation: u32) -> (u32, u32, u32) {
    match rotation % 360 {
        90 | 270 => (height, width, 0),
        _ => (width, height, 0),
    }
}

/// Builds the immutable per-request encoding plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder {
    pub bitrate: BitratePlanner,
}

impl PlanBuilder {
    pub fn new(bitrate: BitratePlanner) -> Self {
        Self { bitrate }
    }

    /// Combine source metadata, window and configuration into an [`EncodingPlan`]
    pub fn build(
        &self,
        metadata: &SourceMetadata,
        window: TimeWindow,
        config: &Configuration,
    ) -> Result<EncodingPlan, DomainError> {
        let quality = match (config.max_size_mb, config.video_bitrate_mbps) {
            (Some(max_mb), None) => BitratePlanner::fit_quality_to_size(
                metadata.bitrate,
                config.quality,
                window.clipped_seconds(),
                max_mb,
            ),
            _ => config.quality,
        };

        let bitrate = self.bitrate.plan(
            metadata.bitrate,
            quality,
            config.video_bitrate_mbps,
            config.min_bitrate_check,
        )?;

        let (width, height) = match &config.resizer {
            Some(policy) => policy.resize(metadata.width, metadata.height),
            None => (round_even(metadata.width), round_even(metadata.height)),
        };
        let (width, height, rotation) = normalize_rotation(width, height, metadata.rotation);

        if width == 0 || height == 0 {
            return Err(DomainError::BadArgs(format!(
                "resize produced empty dimensions {}x{}",
                width, height
            )));
        }

        Ok(EncodingPlan { width, height, bitrate, rotation, quality, window })
    }
}

#[cfg(test)]
mod tests;
