//! Tests for brightness limiting and blending of node colors

use gpuport::color::{NodeColor, DEFAULT_BRIGHTNESS_CEILING, FULL_BRIGHTNESS};
use proptest::prelude::*;

#[cfg(test)]
mod color_tests {
    use super::*;

    /// Test: full white is clamped to 212 per channel at the default ceiling
    #[test]
    fn test_white_clamps_to_ceiling() {
        let white = NodeColor::from_rgb(255, 255, 255);
        assert_eq!(white.brightness(), 765);

        let limited = white.limit(636);
        assert_eq!((limited.r(), limited.g(), limited.b()), (212, 212, 212));
        assert_eq!(limited.brightness(), 636);
        assert_eq!(limited.r(), limited.g());
        assert_eq!(limited.g(), limited.b());
    }

    /// Test: hue ratios survive limiting
    #[test]
    fn test_limit_preserves_ratio() {
        let orange = NodeColor::from_rgb(240, 120, 0);
        let limited = orange.limit(180);
        assert_eq!((limited.r(), limited.g(), limited.b()), (120, 60, 0));
    }

    /// Test: opaque blends replace, transparent blends are no-ops
    #[test]
    fn test_blend_extremes() {
        let dst = NodeColor::from_rgb(10, 20, 30);
        assert_eq!(NodeColor::BLUE.blend_over(dst), NodeColor::BLUE);
        assert_eq!(NodeColor::from_argb(0, 99, 99, 99).blend_over(dst), dst);
    }

    proptest! {
        /// Test: limited colors never exceed the ceiling
        #[test]
        fn prop_limit_within_ceiling(argb in any::<u32>(), ceiling in 1u32..=FULL_BRIGHTNESS) {
            let color = NodeColor(argb);
            let limited = color.limit(ceiling);
            prop_assert!(limited.brightness() <= ceiling);
            prop_assert_eq!(limited.a(), color.a());
        }

        /// Test: colors within the ceiling are left alone
        #[test]
        fn prop_limit_identity_below_ceiling(argb in any::<u32>(), ceiling in 1u32..=FULL_BRIGHTNESS) {
            let color = NodeColor(argb);
            prop_assume!(color.brightness() <= ceiling);
            prop_assert_eq!(color.limit(ceiling), color);
        }

        /// Test: limiting twice is the same as limiting once
        #[test]
        fn prop_limit_idempotent(argb in any::<u32>()) {
            let once = NodeColor(argb).limit(DEFAULT_BRIGHTNESS_CEILING);
            prop_assert_eq!(once.limit(DEFAULT_BRIGHTNESS_CEILING), once);
        }

        /// Test: blending always yields an opaque color, or the destination for alpha 0
        #[test]
        fn prop_blend_result(src in any::<u32>(), dst in any::<u32>()) {
            let src = NodeColor(src);
            let dst = NodeColor(dst);
            let out = src.blend_over(dst);
            if src.a() == 0 {
                prop_assert_eq!(out, dst);
            } else {
                prop_assert!(out.is_opaque());
            }
        }
    }
}
