//! Display timing and pixel packing configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GpuPortError, Result};

/// Byte positions of the color channels within a pixel word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Red in bits 16..24, blue in bits 0..8
    #[default]
    Argb,
    /// Blue in bits 16..24, red in bits 0..8
    Abgr,
}

/// Byte order of a pixel word in display memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// How an ARGB value is laid out in display memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelFormat {
    pub order: ChannelOrder,
    pub endian: Endian,
}

impl PixelFormat {
    pub const fn new(order: ChannelOrder, endian: Endian) -> Self {
        Self { order, endian }
    }

    /// Convert an ARGB value into the word to store in display memory
    #[inline]
    pub fn pack(self, argb: u32) -> u32 {
        let ordered = match self.order {
            ChannelOrder::Argb => argb,
            ChannelOrder::Abgr => {
                (argb & 0xFF00_FF00) | ((argb >> 16) & 0xFF) | ((argb & 0xFF) << 16)
            }
        };
        match self.endian {
            Endian::Little => u32::from_ne_bytes(ordered.to_le_bytes()),
            Endian::Big => u32::from_ne_bytes(ordered.to_be_bytes()),
        }
    }
}

/// Video mode the encoder is generating a signal for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySurfaceConfig {
    /// Pixel clock in Hz
    pub pixel_clock_hz: u64,
    /// Pixels per scan line, blanking included
    pub h_total: u32,
    /// Visible pixels per scan line
    pub h_visible: u32,
    /// Scan lines per frame, blanking included
    pub v_total: u32,
    /// Visible scan lines per frame
    pub v_visible: u32,
    pub pixel_format: PixelFormat,
    /// Framebuffer device for the framebuffer backend
    pub device: Option<PathBuf>,
}

impl Default for DisplaySurfaceConfig {
    /// 52.8 MHz, 22 pixels per bit slice, about 29.4 frames per second
    fn default() -> Self {
        Self {
            pixel_clock_hz: 52_800_000,
            h_total: 1584,
            h_visible: 1562,
            v_total: 1135,
            v_visible: 1111,
            pixel_format: PixelFormat::default(),
            device: None,
        }
    }
}

impl DisplaySurfaceConfig {
    pub fn new(pixel_clock_hz: u64, h_total: u32, h_visible: u32, v_total: u32, v_visible: u32) -> Self {
        Self {
            pixel_clock_hz,
            h_total,
            h_visible,
            v_total,
            v_visible,
            ..Default::default()
        }
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Time to scan out one full frame, blanking included
    pub fn frame_period(&self) -> Duration {
        if self.pixel_clock_hz == 0 {
            return Duration::ZERO;
        }
        let pixels = self.h_total as u128 * self.v_total as u128;
        Duration::from_nanos((pixels * 1_000_000_000 / self.pixel_clock_hz as u128) as u64)
    }

    pub fn fps(&self) -> f64 {
        let pixels = self.h_total as f64 * self.v_total as f64;
        if pixels == 0.0 {
            return 0.0;
        }
        self.pixel_clock_hz as f64 / pixels
    }

    /// Time to scan out one line
    pub fn line_ns(&self) -> f64 {
        self.h_total as f64 * 1e9 / self.pixel_clock_hz as f64
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pixel_clock_hz == 0 {
            return Err(GpuPortError::invalid_parameter(
                "pixel_clock_hz",
                "Pixel clock must be greater than 0",
            ));
        }
        if self.h_visible == 0 || self.v_visible == 0 {
            return Err(GpuPortError::invalid_parameter(
                "visible",
                "Visible width and height must be greater than 0",
            ));
        }
        if self.h_visible > self.h_total {
            return Err(GpuPortError::invalid_parameter(
                "h_visible",
                format!("{} exceeds h_total {}", self.h_visible, self.h_total),
            ));
        }
        if self.v_visible > self.v_total {
            return Err(GpuPortError::invalid_parameter(
                "v_visible",
                format!("{} exceeds v_total {}", self.v_visible, self.v_total),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = DisplaySurfaceConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.fps() - 29.37).abs() < 0.01);
        assert_eq!(config.frame_period(), Duration::from_nanos(34_050_000));
    }

    #[test]
    fn test_pack_argb_little() {
        let format = PixelFormat::default();
        let packed = format.pack(0xFF11_2233);
        assert_eq!(packed.to_ne_bytes(), [0x33, 0x22, 0x11, 0xFF]);
    }

    #[test]
    fn test_pack_abgr_big() {
        let format = PixelFormat::new(ChannelOrder::Abgr, Endian::Big);
        let packed = format.pack(0xFF11_2233);
        assert_eq!(packed.to_ne_bytes(), [0xFF, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_validation() {
        let mut config = DisplaySurfaceConfig::default();
        config.h_visible = config.h_total + 1;
        assert!(config.validate().is_err());

        let config = DisplaySurfaceConfig::new(0, 72, 71, 10, 8);
        assert!(config.validate().is_err());
    }
}
