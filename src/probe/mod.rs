//! Source metadata probing and time-window derivation

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{Configuration, SourceMetadata, TimeWindow};
use crate::ports::{MediaInfoPort, RawMetadata};

/// Width used when the source does not report one
pub const FALLBACK_WIDTH: f64 = 368.0;
/// Height used when the source does not report one
pub const FALLBACK_HEIGHT: f64 = 640.0;

/// Probed metadata together with the clip window it implies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub metadata: SourceMetadata,
    pub window: TimeWindow,
}

/// Reads source metadata through a [`MediaInfoPort`] and validates it
pub struct MetadataProber {
    media_info: Arc<dyn MediaInfoPort>,
    fallback_width: f64,
    fallback_height: f64,
}

impl MetadataProber {
    pub fn new(media_info: Arc<dyn MediaInfoPort>) -> Self {
        Self {
            media_info,
            fallback_width: FALLBACK_WIDTH,
            fallback_height: FALLBACK_HEIGHT,
        }
    }

    pub fn with_fallback_dimensions(mut self, width: f64, height: f64) -> Self {
        self.fallback_width = width;
        self.fallback_height = height;
        self
    }

    /// Probe `path` and compute the clip window for `config`
    #[instrument(skip(self, config), fields(path = %path.display()))]
    pub async fn probe(&self, path: &Path, config: &Configuration) -> Result<ProbeReport, DomainError> {
        let raw = self.media_info.retrieve(path).await?;
        let metadata = self.parse(&raw)?;
        let window = TimeWindow::from_seconds(config.start_time, config.end_time, metadata.duration_us)?;

        debug!(
            width = metadata.width,
            height = metadata.height,
            rotation = metadata.rotation,
            bitrate = metadata.bitrate,
            duration_us = metadata.duration_us,
            start_us = window.start_us,
            end_us = window.end_us,
            "Probed source"
        );

        Ok(ProbeReport { metadata, window })
    }

    /// Turn raw retriever strings into [`SourceMetadata`].
    ///
    /// Rotation, bitrate and duration are required; dimensions fall back.
    pub fn parse(&self, raw: &RawMetadata) -> Result<SourceMetadata, DomainError> {
        let rotation = required_number(raw.rotation.as_deref(), "rotation")?;
        let bitrate = required_number(raw.bitrate.as_deref(), "bitrate")?;
        let duration_ms = required_number(raw.duration_ms.as_deref(), "duration")?;

        if bitrate < 0.0 || duration_ms < 0.0 {
            return Err(DomainError::MetadataUnavailable(format!(
                "negative bitrate ({}) or duration ({})",
                bitrate, duration_ms
            )));
        }

        Ok(SourceMetadata {
            width: dimension_or(raw.width.as_deref(), self.fallback_width, "width"),
            height: dimension_or(raw.height.as_deref(), self.fallback_height, "height"),
            rotation: normalize_degrees(rotation)?,
            bitrate: bitrate.round() as u64,
            duration_us: (duration_ms * 1000.0).round() as i64,
        })
    }
}

fn required_number(value: Option<&str>, field: &str) -> Result<f64, DomainError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::MetadataUnavailable(format!("{} missing", field)))?;

    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DomainError::MetadataUnavailable(format!("{} is not a number: {:?}", field, value)))
}

fn dimension_or(value: Option<&str>, fallback: f64, field: &str) -> f64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => fallback,
        Some(v) => match v.parse::<f64>() {
            Ok(parsed) if parsed > 0.0 && parsed.is_finite() => parsed,
            _ => {
                warn!(field, value = v, fallback, "Unusable dimension, using fallback");
                fallback
            }
        },
    }
}

fn normalize_degrees(rotation: f64) -> Result<u32, DomainError> {
    let degrees = (rotation.round() as i64).rem_euclid(360) as u32;
    match degrees {
        0 | 90 | 180 | 270 => Ok(degrees),
        other => Err(DomainError::MetadataUnavailable(format!("unsupported rotation {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedInfo(RawMetadata);

    #[async_trait]
    impl MediaInfoPort for FixedInfo {
        async fn retrieve(&self, _path: &Path) -> Result<RawMetadata, DomainError> {
            Ok(self.0.clone())
        }
    }

    fn raw(width: Option<&str>, height: Option<&str>, rotation: Option<&str>) -> RawMetadata {
        RawMetadata {
            width: width.map(String::from),
            height: height.map(String::from),
            rotation: rotation.map(String::from),
            bitrate: Some("8000000".to_string()),
            duration_ms: Some("10500".to_string()),
        }
    }

    fn prober(raw: RawMetadata) -> MetadataProber {
        MetadataProber::new(Arc::new(FixedInfo(raw)))
    }

    #[test]
    fn test_parse_complete_metadata() {
        let metadata = prober(RawMetadata::default())
            .parse(&raw(Some("1920"), Some("1080"), Some("90")))
            .unwrap();
        assert_eq!(metadata.width, 1920.0);
        assert_eq!(metadata.height, 1080.0);
        assert_eq!(metadata.rotation, 90);
        assert_eq!(metadata.bitrate, 8_000_000);
        assert_eq!(metadata.duration_us, 10_500_000);
    }

    #[test]
    fn test_missing_dimensions_fall_back() {
        let metadata = prober(RawMetadata::default())
            .parse(&raw(None, Some(""), Some("0")))
            .unwrap();
        assert_eq!((metadata.width, metadata.height), (368.0, 640.0));
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let p = prober(RawMetadata::default());
        assert!(matches!(
            p.parse(&raw(Some("10"), Some("10"), None)),
            Err(DomainError::MetadataUnavailable(_))
        ));

        let mut no_bitrate = raw(None, None, Some("0"));
        no_bitrate.bitrate = Some(" ".to_string());
        assert!(p.parse(&no_bitrate).is_err());

        let mut no_duration = raw(None, None, Some("0"));
        no_duration.duration_ms = None;
        assert!(p.parse(&no_duration).is_err());
    }

    #[test]
    fn test_rotation_is_normalized() {
        let p = prober(RawMetadata::default());
        assert_eq!(p.parse(&raw(None, None, Some("-90"))).unwrap().rotation, 270);
        assert_eq!(p.parse(&raw(None, None, Some("450"))).unwrap().rotation, 90);
        assert!(p.parse(&raw(None, None, Some("45"))).is_err());
    }

    #[tokio::test]
    async fn test_probe_builds_window() {
        let config = Configuration {
            start_time: Some(2),
            end_time: Some(30),
            ..Configuration::default()
        };
        let report = prober(raw(Some("1280"), Some("720"), Some("0")))
            .probe(Path::new("clip.mp4"), &config)
            .await
            .unwrap();
        assert_eq!(report.window.start_us, 2_000_000);
        assert_eq!(report.window.end_us, 10_500_000);
        assert_eq!(report.window.clipped_duration_us, 9_000_000);
    }

    #[tokio::test]
    async fn test_probe_rejects_start_past_duration() {
        let config = Configuration { start_time: Some(20), ..Configuration::default() };
        let err = prober(raw(None, None, Some("0")))
            .probe(Path::new("clip.mp4"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTimeRange(_)));
    }
}
