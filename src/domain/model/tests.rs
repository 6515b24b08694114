// Unit tests for domain models

#[cfg(test)]
mod tests {
    use crate::domain::errors::*;
    use crate::domain::model::*;

    fn named(count: usize) -> Configuration {
        Configuration {
            video_names: (0..count).map(|i| format!("clip_{}", i)).collect(),
            ..Configuration::default()
        }
    }

    #[test]
    fn test_quality_multipliers_strictly_increase() {
        let multipliers: Vec<f64> = VideoQuality::ALL.iter().map(|q| q.bitrate_multiplier()).collect();
        assert_eq!(multipliers, vec![0.1, 0.2, 0.3, 0.4, 0.6]);
        assert!(multipliers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_quality_lower_saturates() {
        assert_eq!(VideoQuality::VeryHigh.lower(), VideoQuality::High);
        assert_eq!(VideoQuality::High.lower(), VideoQuality::Medium);
        assert_eq!(VideoQuality::Medium.lower(), VideoQuality::Low);
        assert_eq!(VideoQuality::Low.lower(), VideoQuality::VeryLow);
        assert_eq!(VideoQuality::VeryLow.lower(), VideoQuality::VeryLow);
    }

    #[test]
    fn test_quality_parse() {
        assert_eq!(VideoQuality::parse("medium").unwrap(), VideoQuality::Medium);
        assert_eq!(VideoQuality::parse("very-high").unwrap(), VideoQuality::VeryHigh);
        assert_eq!(VideoQuality::parse("VERY_LOW").unwrap(), VideoQuality::VeryLow);
        assert!(matches!(VideoQuality::parse("ultra"), Err(DomainError::BadArgs(_))));
    }

    #[test]
    fn test_quality_display_round_trips_through_parse() {
        for quality in VideoQuality::ALL {
            assert_eq!(VideoQuality::parse(&quality.to_string()).unwrap(), quality);
        }
    }

    #[test]
    fn test_configuration_defaults() {
        let config = Configuration::default();
        assert_eq!(config.quality, VideoQuality::VeryHigh);
        assert!(config.min_bitrate_check);
        assert_eq!(config.resizer, Some(ResizePolicy::Automatic));
        assert!(!config.disable_audio);
        assert!(config.video_bitrate_mbps.is_none());
    }

    #[test]
    fn test_configuration_rejects_name_count_mismatch() {
        let config = named(3);
        assert!(config.validate(3).is_ok());
        assert!(matches!(config.validate(2), Err(DomainError::BadArgs(_))));
    }

    #[test]
    fn test_configuration_rejects_blank_name() {
        let mut config = named(2);
        config.video_names[1] = "  ".to_string();
        assert!(matches!(config.validate(2), Err(DomainError::BadArgs(_))));
    }

    #[test]
    fn test_configuration_rejects_inverted_range() {
        let mut config = named(1);
        config.start_time = Some(10);
        config.end_time = Some(10);
        assert!(matches!(config.validate(1), Err(DomainError::InvalidTimeRange(_))));

        config.end_time = Some(11);
        assert!(config.validate(1).is_ok());
    }

    #[test]
    fn test_configuration_rejects_bad_scale() {
        let mut config = named(1);
        config.resizer = Some(ResizePolicy::Scale { factor: 0.0 });
        assert!(config.validate(1).is_err());
        config.resizer = Some(ResizePolicy::Scale { factor: f64::NAN });
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_configuration_from_toml() {
        let config: Configuration = toml::from_str(
            r#"
            quality = "medium"
            start_time = 2
            video_names = ["a"]

            [resizer]
            kind = "limit_dimension"
            max_width = 1280.0
            max_height = 720.0
            "#,
        )
        .unwrap();

        assert_eq!(config.quality, VideoQuality::Medium);
        assert_eq!(config.start_time, Some(2));
        assert!(config.min_bitrate_check);
        assert_eq!(
            config.resizer,
            Some(ResizePolicy::LimitDimension { max_width: 1280.0, max_height: 720.0 })
        );
    }

    #[test]
    fn test_time_window_defaults_to_full_source() {
        let window = TimeWindow::from_seconds(None, None, 12_400_000).unwrap();
        assert_eq!(window.start_us, 0);
        assert_eq!(window.end_us, 12_400_000);
        assert_eq!(window.clipped_duration_us, 12_000_000);
        assert_eq!(window.clipped_seconds(), 12);
    }

    #[test]
    fn test_time_window_clamps_end_to_duration() {
        let window = TimeWindow::from_seconds(Some(2), Some(60), 10_000_000).unwrap();
        assert_eq!(window.start_us, 2_000_000);
        assert_eq!(window.end_us, 10_000_000);
        assert_eq!(window.clipped_duration_us, 8_000_000);
    }

    #[test]
    fn test_time_window_rounds_clipped_duration() {
        let window = TimeWindow::from_seconds(Some(1), None, 3_600_000).unwrap();
        assert_eq!(window.exact_duration_us(), 2_600_000);
        assert_eq!(window.clipped_duration_us, 3_000_000);
    }

    #[test]
    fn test_time_window_rejects_start_past_end() {
        assert!(matches!(
            TimeWindow::from_seconds(Some(5), Some(5), 10_000_000),
            Err(DomainError::InvalidTimeRange(_))
        ));
        assert!(TimeWindow::from_seconds(Some(20), None, 10_000_000).is_err());
    }

    #[test]
    fn test_progress_percent_is_clamped() {
        let window = TimeWindow::from_seconds(Some(1), Some(5), 10_000_000).unwrap();
        assert_eq!(window.progress_percent(0), 0.0);
        assert_eq!(window.progress_percent(3_000_000), 50.0);
        assert_eq!(window.progress_percent(9_000_000), 100.0);
    }

    #[test]
    fn test_progress_percent_uses_exact_window_when_rounding_to_zero() {
        let window = TimeWindow::from_seconds(None, None, 400_000).unwrap();
        assert_eq!(window.clipped_duration_us, 0);
        assert_eq!(window.progress_percent(200_000), 50.0);
    }

    #[test]
    fn test_job_result_from_domain_error() {
        let result: JobResult = DomainError::InsufficientSourceBitrate {
            source_bitrate: 1_000_000,
            floor: 2_000_000,
        }
        .into();
        assert_eq!(result, JobResult::failure(INSUFFICIENT_BITRATE_MESSAGE));
        assert!(!result.is_success());
    }
}
