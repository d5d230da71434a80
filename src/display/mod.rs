//! Display surfaces the encoded frames are scanned out from
//!
//! Only the session owner ever opens a surface, lazily on its first
//! `ready()`. Backends are interchangeable behind [`DisplayBackend`]:
//! - `headless`: in-memory surface that records frames
//! - `framebuffer`: Linux console framebuffer (`/dev/fbN`)

pub mod config;
#[cfg(target_os = "linux")]
pub mod framebuffer;
pub mod headless;

pub use config::{ChannelOrder, DisplaySurfaceConfig, Endian, PixelFormat};
#[cfg(target_os = "linux")]
pub use framebuffer::{FramebufferBackend, FramebufferSurface};
pub use headless::{HeadlessBackend, HeadlessSurface};

use crate::error::Result;

/// Geometry of the writable pixel area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub width: usize,
    pub height: usize,
    /// Distance between row starts, in pixels
    pub pitch: usize,
}

/// An open display that scans out 32-bit pixels
pub trait DisplaySurface: Send {
    fn pixel_region(&self) -> PixelRegion;

    /// Copy a `width x height` frame (row-major, no padding) to the display
    /// and wait for it to be scanned out. May block for up to one frame period.
    fn present(&mut self, pixels: &[u32]) -> Result<()>;

    /// Wait for the next vertical blank
    fn vsync(&mut self) -> Result<()>;

    fn close(&mut self);
}

/// Factory for display surfaces
pub trait DisplayBackend: Send {
    /// Open a surface in the configured mode. Missing devices, permission
    /// problems and mode mismatches are fatal.
    fn open(&mut self, config: &DisplaySurfaceConfig) -> Result<Box<dyn DisplaySurface>>;

    fn name(&self) -> &'static str;
}

/// Paces to a fixed frame period when no hardware vsync is available
#[derive(Debug)]
pub(crate) struct SleepPacer {
    period: std::time::Duration,
    next: Option<std::time::Instant>,
}

impl SleepPacer {
    pub(crate) fn new(period: std::time::Duration) -> Self {
        Self { period, next: None }
    }

    /// Sleep until the next frame boundary
    pub(crate) fn wait(&mut self) {
        let now = std::time::Instant::now();
        let target = match self.next {
            Some(next) if next > now => next,
            _ => now + self.period,
        };
        std::thread::sleep(target.saturating_duration_since(now));
        self.next = Some(target + self.period);
    }
}
