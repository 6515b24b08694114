// Unit tests for business rules

#[cfg(test)]
mod tests {
    use crate::domain::errors::*;
    use crate::domain::model::*;
    use crate::domain::rules::*;

    fn metadata(width: f64, height: f64, rotation: u32, bitrate: u64) -> SourceMetadata {
        SourceMetadata {
            width,
            height,
            rotation,
            bitrate,
            duration_us: 10_000_000,
        }
    }

    fn full_window() -> TimeWindow {
        TimeWindow::from_seconds(None, None, 10_000_000).unwrap()
    }

    fn aspect_close(source: (f64, f64), target: (u32, u32)) -> bool {
        // Re-derive the height from the width at the source aspect and allow
        // one unit of rounding on top of the even rounding.
        let expected_h = target.0 as f64 * source.1 / source.0;
        (expected_h - target.1 as f64).abs() <= 2.0
    }

    #[test]
    fn test_auto_scale_factor_thresholds() {
        assert_eq!(auto_scale_factor(3840.0, 2160.0), 0.5);
        assert_eq!(auto_scale_factor(1080.0, 1920.0), 0.5);
        assert_eq!(auto_scale_factor(1280.0, 720.0), 0.75);
        assert_eq!(auto_scale_factor(960.0, 540.0), 0.95);
        assert_eq!(auto_scale_factor(640.0, 480.0), 0.9);
    }

    #[test]
    fn test_round_even() {
        assert_eq!(round_even(1026.0), 1026);
        assert_eq!(round_even(513.0), 514);
        assert_eq!(round_even(512.9), 512);
        assert_eq!(round_even(-4.0), 0);
        assert_eq!(round_even(f64::NAN), 0);
    }

    #[test]
    fn test_automatic_resize_4k() {
        assert_eq!(ResizePolicy::Automatic.resize(3840.0, 2160.0), (1920, 1080));
    }

    #[test]
    fn test_scale_resize() {
        let policy = ResizePolicy::Scale { factor: 0.5 };
        assert_eq!(policy.resize(1280.0, 720.0), (640, 360));
    }

    #[test]
    fn test_limit_dimension_keeps_small_sources() {
        let policy = ResizePolicy::limit_size(1280.0);
        assert_eq!(policy.resize(640.0, 480.0), (640, 480));
    }

    #[test]
    fn test_limit_dimension_shrinks_keeping_aspect() {
        let policy = ResizePolicy::LimitDimension { max_width: 1280.0, max_height: 720.0 };
        assert_eq!(policy.resize(1920.0, 1080.0), (1280, 720));

        let portrait = policy.resize(1080.0, 1920.0);
        assert_eq!(portrait, (406, 720));
        assert!(portrait.0 <= 1280 && portrait.1 <= 720);
    }

    #[test]
    fn test_match_dimension_stretch_is_exact_and_idempotent() {
        let policy = ResizePolicy::MatchDimension { width: 500.0, height: 300.0, stretch: true };
        let once = policy.resize(1920.0, 1080.0);
        assert_eq!(once, (500, 300));
        assert_eq!(policy.resize(once.0 as f64, once.1 as f64), once);
    }

    #[test]
    fn test_match_dimension_fit() {
        let policy = ResizePolicy::match_size(720.0, false);
        assert_eq!(policy.resize(1920.0, 1080.0), (720, 406));
    }

    #[test]
    fn test_aspect_preserving_policies() {
        let sources = [(1920.0, 1080.0), (1080.0, 1920.0), (1440.0, 1080.0), (854.0, 480.0)];
        let policies = [
            ResizePolicy::Automatic,
            ResizePolicy::limit_size(640.0),
            ResizePolicy::MatchDimension { width: 800.0, height: 600.0, stretch: false },
        ];
        for source in sources {
            for policy in policies {
                let target = policy.resize(source.0, source.1);
                assert!(
                    aspect_close(source, target),
                    "{:?} on {:?} gave {:?}",
                    policy,
                    source,
                    target
                );
            }
        }
    }

    #[test]
    fn test_bitrate_for_every_quality() {
        let planner = BitratePlanner::default();
        for quality in VideoQuality::ALL {
            let target = planner.plan(8_000_000, quality, None, true).unwrap();
            assert_eq!(target, (8_000_000.0 * quality.bitrate_multiplier()).round() as u64);
        }
        assert_eq!(planner.plan(8_000_000, VideoQuality::Medium, None, true).unwrap(), 2_400_000);
    }

    #[test]
    fn test_bitrate_floor_is_inclusive() {
        let planner = BitratePlanner::default();
        assert!(matches!(
            planner.plan(2_000_000, VideoQuality::High, None, true),
            Err(DomainError::InsufficientSourceBitrate { source_bitrate: 2_000_000, floor: 2_000_000 })
        ));
        assert!(planner.plan(2_000_001, VideoQuality::High, None, true).is_ok());
        assert_eq!(planner.plan(1_000_000, VideoQuality::High, None, false).unwrap(), 400_000);
    }

    #[test]
    fn test_explicit_bitrate_bypasses_floor() {
        let planner = BitratePlanner::default();
        assert_eq!(planner.plan(500_000, VideoQuality::Low, Some(3), true).unwrap(), 3_000_000);
    }

    #[test]
    fn test_estimate_compressed_size() {
        assert_eq!(BitratePlanner::estimate_compressed_size_mb(8_388_608, 10), 10);
        assert_eq!(BitratePlanner::estimate_compressed_size_mb(2_400_000, 60), 17);
        assert_eq!(BitratePlanner::estimate_compressed_size_mb(0, 60), 0);
    }

    #[test]
    fn test_fit_quality_to_size_steps_down() {
        // 10 Mbps for 60 s: VeryHigh ~43 MiB, High ~29, Medium ~21, Low ~14
        let quality = BitratePlanner::fit_quality_to_size(10_000_000, VideoQuality::VeryHigh, 60, 20);
        assert_eq!(quality, VideoQuality::Low);

        let floor = BitratePlanner::fit_quality_to_size(10_000_000, VideoQuality::VeryHigh, 60, 1);
        assert_eq!(floor, VideoQuality::VeryLow);
    }

    #[test]
    fn test_rotation_normalization() {
        assert_eq!(normalize_rotation(1080, 1920, 90), (1920, 1080, 0));
        assert_eq!(normalize_rotation(1080, 1920, 270), (1920, 1080, 0));
        assert_eq!(normalize_rotation(1080, 1920, 180), (1080, 1920, 0));
        assert_eq!(normalize_rotation(1080, 1920, 0), (1080, 1920, 0));
    }

    #[test]
    fn test_plan_4k_medium_automatic() {
        let config = Configuration { quality: VideoQuality::Medium, ..Configuration::default() };
        let plan = PlanBuilder::default()
            .build(&metadata(3840.0, 2160.0, 0, 8_000_000), full_window(), &config)
            .unwrap();
        assert_eq!((plan.width, plan.height), (1920, 1080));
        assert_eq!(plan.bitrate, 2_400_000);
        assert_eq!(plan.rotation, 0);
    }

    #[test]
    fn test_plan_swaps_rotated_source() {
        let config = Configuration { resizer: None, ..Configuration::default() };
        let plan = PlanBuilder::default()
            .build(&metadata(1080.0, 1920.0, 90, 8_000_000), full_window(), &config)
            .unwrap();
        assert_eq!((plan.width, plan.height, plan.rotation), (1920, 1080, 0));
    }

    #[test]
    fn test_plan_applies_max_size() {
        let config = Configuration { max_size_mb: Some(20), ..Configuration::default() };
        let window = TimeWindow::from_seconds(None, None, 60_000_000).unwrap();
        let plan = PlanBuilder::default()
            .build(&metadata(1280.0, 720.0, 0, 10_000_000), window, &config)
            .unwrap();
        assert_eq!(plan.quality, VideoQuality::Low);
        assert_eq!(plan.bitrate, 2_000_000);
        assert!(plan.estimated_size_mb() <= 20);
    }

    #[test]
    fn test_plan_rejects_low_bitrate_source() {
        let config = Configuration::default();
        let err = PlanBuilder::default()
            .build(&metadata(1280.0, 720.0, 0, 1_500_000), full_window(), &config)
            .unwrap_err();
        assert_eq!(err.to_string(), INSUFFICIENT_BITRATE_MESSAGE);
    }
}
