//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

use crate::domain::model::{Configuration, ResizePolicy, VideoQuality};

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Source video to probe (requires the `libav` feature)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Source width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Source height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Source rotation in degrees
    #[arg(long)]
    pub rotation: Option<u32>,

    /// Source bitrate in bits per second
    #[arg(long)]
    pub bitrate: Option<u64>,

    /// Source duration in milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Quality tier: very_low, low, medium, high, very_high
    #[arg(short, long, default_value = "very_high", value_parser = parse_quality)]
    pub quality: VideoQuality,

    /// Explicit target bitrate in Mbps (skips the minimum bitrate check)
    #[arg(long)]
    pub bitrate_mbps: Option<u32>,

    /// Allow sources at or below the minimum bitrate
    #[arg(long)]
    pub no_min_bitrate_check: bool,

    /// Resize policy: auto, keep, scale:F, limit:WxH, match:WxH or stretch:WxH
    #[arg(long, default_value = "auto", value_parser = parse_resize)]
    pub resize: ResizeArg,

    /// Clip start in seconds
    #[arg(short, long)]
    pub start: Option<u32>,

    /// Clip end in seconds
    #[arg(short, long)]
    pub end: Option<u32>,

    /// Step the quality down until the estimate fits this many MiB
    #[arg(long)]
    pub max_size_mb: Option<u32>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    /// True when any source property was given on the command line
    pub fn has_metadata_flags(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.rotation.is_some()
            || self.bitrate.is_some()
            || self.duration_ms.is_some()
    }

    pub fn configuration(&self) -> Configuration {
        Configuration {
            quality: self.quality,
            min_bitrate_check: !self.no_min_bitrate_check,
            video_bitrate_mbps: self.bitrate_mbps,
            resizer: self.resize.0,
            start_time: self.start,
            end_time: self.end,
            max_size_mb: self.max_size_mb,
            ..Configuration::default()
        }
    }
}

/// Arguments for the faststart command
#[derive(Args, Debug)]
pub struct FaststartArgs {
    /// MP4 file to rewrite
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination of the rewritten file
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Parsed `--resize`; `None` keeps the source resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeArg(pub Option<ResizePolicy>);

fn parse_quality(value: &str) -> Result<VideoQuality, String> {
    VideoQuality::parse(value).map_err(|e| e.to_string())
}

fn parse_dimensions(value: &str) -> Result<(f64, f64), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", value))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|n| *n > 0.0 && n.is_finite())
            .ok_or_else(|| format!("invalid dimension {:?}", v))
    };
    Ok((parse(width)?, parse(height)?))
}

pub fn parse_resize(value: &str) -> Result<ResizeArg, String> {
    let (kind, params) = match value.split_once(':') {
        Some((kind, params)) => (kind, Some(params)),
        None => (value, None),
    };

    let policy = match (kind.to_ascii_lowercase().as_str(), params) {
        ("auto", None) => Some(ResizePolicy::Automatic),
        ("keep", None) => None,
        ("scale", Some(factor)) => {
            let factor = factor
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| *f > 0.0 && f.is_finite())
                .ok_or_else(|| format!("invalid scale factor {:?}", factor))?;
            Some(ResizePolicy::Scale { factor })
        }
        ("limit", Some(dims)) => {
            let (max_width, max_height) = parse_dimensions(dims)?;
            Some(ResizePolicy::LimitDimension { max_width, max_height })
        }
        ("match", Some(dims)) | ("stretch", Some(dims)) => {
            let (width, height) = parse_dimensions(dims)?;
            Some(ResizePolicy::MatchDimension { width, height, stretch: kind.eq_ignore_ascii_case("stretch") })
        }
        _ => return Err(format!("unknown resize policy {:?}", value)),
    };
    Ok(ResizeArg(policy))
}
