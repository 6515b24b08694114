//! Encoder configuration and selection

use tracing::{debug, info, warn};

use crate::domain::errors::PipelineResult;
use crate::domain::model::EncodingPlan;
use crate::engine::PumpConfig;
use crate::ports::*;

/// Build the encoder settings for `plan` from the source video track.
///
/// Frame rate and I-frame interval come from the source when present; color
/// description keys are copied through unchanged.
pub fn derive_settings(plan: &EncodingPlan, input: &TrackFormat, config: &PumpConfig) -> EncoderSettings {
    EncoderSettings {
        mime: VIDEO_MIME_AVC.to_string(),
        width: plan.width,
        height: plan.height,
        bitrate: plan.bitrate,
        frame_rate: input.frame_rate.filter(|r| *r > 0).unwrap_or(config.default_frame_rate),
        i_frame_interval: input.i_frame_interval.unwrap_or(config.default_i_frame_interval),
        bitrate_mode: BitrateMode::Constant,
        surface_input: true,
        color_standard: input.color_standard,
        color_transfer: input.color_transfer,
        color_range: input.color_range,
        profile_level: None,
    }
}

/// Pick High, then Main, else Baseline, using the first advertised level of that profile.
///
/// Returns `None` when the encoder advertises nothing for the chosen profile.
pub fn select_profile(levels: &[ProfileLevel]) -> Option<ProfileLevel> {
    let has = |profile| levels.iter().any(|pl| pl.profile == profile);
    let profile = if has(AvcProfile::High) {
        AvcProfile::High
    } else if has(AvcProfile::Main) {
        AvcProfile::Main
    } else {
        AvcProfile::Baseline
    };
    levels.iter().copied().find(|pl| pl.profile == profile)
}

/// Create and configure an encoder, preferring the backend's hardware encoder.
///
/// A preferred encoder that rejects the settings is released and replaced by the
/// default encoder for the MIME type.
pub fn open_encoder(
    backend: &dyn CodecBackend,
    settings: &EncoderSettings,
) -> PipelineResult<Box<dyn VideoEncoder>> {
    let preferred = backend.has_preferred_encoder(&settings.mime);

    match create_configured(backend, settings, preferred) {
        Ok(encoder) => Ok(encoder),
        Err(err) if preferred => {
            warn!(error = %err, "Preferred encoder rejected settings, switching to default encoder");
            create_configured(backend, settings, false)
        }
        Err(err) => Err(err),
    }
}

fn create_configured(
    backend: &dyn CodecBackend,
    settings: &EncoderSettings,
    preferred: bool,
) -> PipelineResult<Box<dyn VideoEncoder>> {
    let mut encoder = backend.create_encoder(&settings.mime, preferred)?;

    let mut settings = settings.clone();
    settings.profile_level = select_profile(&encoder.profile_levels());
    if let Some(pl) = settings.profile_level {
        info!(encoder = encoder.name(), profile = ?pl.profile, level = pl.level, "Selected profile level");
    }
    debug!(?settings, "Configuring encoder");

    if let Err(err) = encoder.configure(&settings) {
        encoder.release();
        return Err(err);
    }
    Ok(encoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{TimeWindow, VideoQuality};

    fn plan() -> EncodingPlan {
        EncodingPlan {
            width: 1280,
            height: 720,
            bitrate: 3_000_000,
            rotation: 0,
            quality: VideoQuality::Medium,
            window: TimeWindow::from_seconds(None, None, 10_000_000).unwrap(),
        }
    }

    fn pl(profile: AvcProfile, level: u32) -> ProfileLevel {
        ProfileLevel { profile, level }
    }

    #[test]
    fn test_select_profile_prefers_high_then_main() {
        let all = [pl(AvcProfile::Baseline, 31), pl(AvcProfile::Main, 40), pl(AvcProfile::High, 41), pl(AvcProfile::High, 51)];
        assert_eq!(select_profile(&all), Some(pl(AvcProfile::High, 41)));

        let no_high = [pl(AvcProfile::Baseline, 31), pl(AvcProfile::Main, 30), pl(AvcProfile::Main, 40)];
        assert_eq!(select_profile(&no_high), Some(pl(AvcProfile::Main, 30)));

        assert_eq!(select_profile(&[pl(AvcProfile::Baseline, 22)]), Some(pl(AvcProfile::Baseline, 22)));
    }

    #[test]
    fn test_select_profile_without_usable_entries() {
        assert_eq!(select_profile(&[]), None);
        assert_eq!(select_profile(&[pl(AvcProfile::Extended, 30), pl(AvcProfile::Other(8), 40)]), None);
    }

    #[test]
    fn test_derive_settings_falls_back_to_defaults() {
        let input = TrackFormat::video(VIDEO_MIME_AVC, 1920, 1080);
        let settings = derive_settings(&plan(), &input, &PumpConfig::default());

        assert_eq!(settings.mime, VIDEO_MIME_AVC);
        assert_eq!((settings.width, settings.height, settings.bitrate), (1280, 720, 3_000_000));
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.i_frame_interval, 1);
        assert_eq!(settings.bitrate_mode, BitrateMode::Constant);
        assert!(settings.surface_input);
        assert_eq!(settings.color_standard, None);
        assert_eq!(settings.profile_level, None);
    }

    #[test]
    fn test_derive_settings_copies_source_track_values() {
        let mut input = TrackFormat::video("video/hevc", 3840, 2160);
        input.frame_rate = Some(24);
        input.i_frame_interval = Some(5);
        input.color_standard = Some(6);
        input.color_transfer = Some(7);
        input.color_range = Some(1);

        let settings = derive_settings(&plan(), &input, &PumpConfig::default());
        assert_eq!(settings.mime, VIDEO_MIME_AVC);
        assert_eq!(settings.frame_rate, 24);
        assert_eq!(settings.i_frame_interval, 5);
        assert_eq!((settings.color_standard, settings.color_transfer, settings.color_range), (Some(6), Some(7), Some(1)));

        input.frame_rate = Some(0);
        assert_eq!(derive_settings(&plan(), &input, &PumpConfig::default()).frame_rate, 30);
    }
}
