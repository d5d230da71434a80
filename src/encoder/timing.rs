//! WS281X bit timing derived from a display mode
//!
//! Every scan line carries one node per output line: 24 bits, each split into
//! lead, data and trail slices of equal width. A 0 bit is high for one slice
//! and a 1 bit for two, so the slice duration has to sit where both pulse
//! widths are inside WS281X tolerances.

use std::time::Duration;

use crate::display::DisplaySurfaceConfig;
use crate::error::{GpuPortError, Result};
use crate::layout::{FrameLayout, BIT_SLICES, VISIBLE_SLICES};

/// Shortest slice: T0H >= 250 ns and T1H >= 650 ns with margin
pub const SLICE_MIN_NS: f64 = 325.0;

/// Longest slice: T0H <= 550 ns and T1H <= 950 ns with margin
pub const SLICE_MAX_NS: f64 = 475.0;

/// Low time that latches the shifted data into the LEDs
pub const RESET_MIN_US: f64 = 50.0;

/// Slice geometry and durations for one display mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitTiming {
    slice_px: usize,
    slice_ns: f64,
    frame: FrameLayout,
    frame_period: Duration,
    blank_us: f64,
}

impl BitTiming {
    /// Derive the bit timing for `config`, failing if WS281X timing cannot be met
    pub fn from_config(config: &DisplaySurfaceConfig) -> Result<Self> {
        config.validate()?;

        let h_total = config.h_total as usize;
        if h_total % BIT_SLICES != 0 {
            return Err(GpuPortError::bit_timing(format!(
                "h_total {} is not a multiple of {} bit slices",
                h_total, BIT_SLICES
            )));
        }
        let slice_px = h_total / BIT_SLICES;

        let h_visible = config.h_visible as usize;
        if h_visible < VISIBLE_SLICES * slice_px {
            return Err(GpuPortError::bit_timing(format!(
                "h_visible {} is shorter than {} slices of {} px",
                h_visible, VISIBLE_SLICES, slice_px
            )));
        }

        let slice_ns = slice_px as f64 * 1e9 / config.pixel_clock_hz as f64;
        if !(SLICE_MIN_NS..=SLICE_MAX_NS).contains(&slice_ns) {
            return Err(GpuPortError::bit_timing(format!(
                "slice of {} px at {} Hz lasts {:.1} ns, needs {}..{} ns",
                slice_px, config.pixel_clock_hz, slice_ns, SLICE_MIN_NS, SLICE_MAX_NS
            )));
        }

        let blank_lines = (config.v_total - config.v_visible) as f64;
        let blank_us = blank_lines * config.line_ns() / 1000.0;
        if blank_us < RESET_MIN_US {
            return Err(GpuPortError::bit_timing(format!(
                "vertical blanking of {:.1} us is shorter than the {} us latch time",
                blank_us, RESET_MIN_US
            )));
        }

        Ok(Self {
            slice_px,
            slice_ns,
            frame: FrameLayout::new(h_visible, config.v_visible as usize, slice_px),
            frame_period: config.frame_period(),
            blank_us,
        })
    }

    pub fn slice_px(&self) -> usize {
        self.slice_px
    }

    pub fn slice_ns(&self) -> f64 {
        self.slice_ns
    }

    /// High time of a 0 bit
    pub fn t0h_ns(&self) -> f64 {
        self.slice_ns
    }

    /// High time of a 1 bit
    pub fn t1h_ns(&self) -> f64 {
        2.0 * self.slice_ns
    }

    pub fn bit_ns(&self) -> f64 {
        3.0 * self.slice_ns
    }

    pub fn frame_layout(&self) -> FrameLayout {
        self.frame
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    pub fn blank_us(&self) -> f64 {
        self.blank_us
    }

    /// Longest universe the visible lines can carry
    pub fn max_universe_len(&self) -> usize {
        self.frame.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        let timing = BitTiming::from_config(&DisplaySurfaceConfig::default()).unwrap();
        assert_eq!(timing.slice_px(), 22);
        assert!((timing.slice_ns() - 416.67).abs() < 0.01);
        assert!((timing.t1h_ns() - 833.33).abs() < 0.01);
        assert_eq!(timing.max_universe_len(), 1111);
        assert_eq!(timing.frame_layout().visible_end(), 1562);
    }

    #[test]
    fn test_width_not_divisible() {
        let config = DisplaySurfaceConfig::new(52_800_000, 1585, 1562, 1135, 1111);
        assert!(matches!(
            BitTiming::from_config(&config),
            Err(GpuPortError::BitTiming { .. })
        ));
    }

    #[test]
    fn test_visible_too_narrow() {
        let config = DisplaySurfaceConfig::new(52_800_000, 1584, 1540, 1135, 1111);
        assert!(BitTiming::from_config(&config).is_err());
    }

    #[test]
    fn test_slice_out_of_tolerance() {
        // 22 px at 40 MHz is 550 ns per slice
        let config = DisplaySurfaceConfig::new(40_000_000, 1584, 1562, 1135, 1111);
        assert!(BitTiming::from_config(&config).is_err());
    }

    #[test]
    fn test_blanking_too_short() {
        // one blank line of 28.8 us
        let config = DisplaySurfaceConfig::new(2_500_000, 72, 71, 9, 8);
        assert!(BitTiming::from_config(&config).is_err());
        let config = DisplaySurfaceConfig::new(2_500_000, 72, 71, 10, 8);
        assert!(BitTiming::from_config(&config).is_ok());
    }
}
