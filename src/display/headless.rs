//! In-memory display surface
//!
//! Records what would have been scanned out. Used for development without
//! display hardware and by the test suite, which can also inject open and
//! present failures.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GpuPortError, Result};

use super::{DisplayBackend, DisplaySurface, DisplaySurfaceConfig, PixelRegion, SleepPacer};

#[derive(Debug, Default)]
struct HeadlessState {
    frames: Mutex<Vec<Vec<u32>>>,
    opens: AtomicUsize,
    presents: AtomicUsize,
    closes: AtomicUsize,
    fail_open: AtomicBool,
    fail_presents: AtomicU32,
}

/// Backend producing [`HeadlessSurface`]s; clones share recorded state
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    state: Arc<HeadlessState>,
    history: usize,
    paced: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            history: 4,
            paced: false,
        }
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the last `frames` presented frames (default 4)
    pub fn with_history(mut self, frames: usize) -> Self {
        self.history = frames;
        self
    }

    /// Sleep one frame period per present, like a real display
    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Make every subsequent `open` fail
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::Relaxed);
    }

    /// Make the next `count` presents fail
    pub fn fail_presents(&self, count: u32) {
        self.state.fail_presents.store(count, Ordering::Relaxed);
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::Relaxed)
    }

    pub fn present_count(&self) -> usize {
        self.state.presents.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::Relaxed)
    }

    /// Recorded frames, oldest first
    pub fn frames(&self) -> Vec<Vec<u32>> {
        self.state
            .frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_frame(&self) -> Option<Vec<u32>> {
        self.state
            .frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl DisplayBackend for HeadlessBackend {
    fn open(&mut self, config: &DisplaySurfaceConfig) -> Result<Box<dyn DisplaySurface>> {
        if self.state.fail_open.load(Ordering::Relaxed) {
            return Err(GpuPortError::display_open("headless display unavailable"));
        }
        config.validate()?;
        self.state.opens.fetch_add(1, Ordering::Relaxed);

        let width = config.h_visible as usize;
        Ok(Box::new(HeadlessSurface {
            state: self.state.clone(),
            region: PixelRegion {
                width,
                height: config.v_visible as usize,
                pitch: width,
            },
            history: self.history,
            pacer: self.paced.then(|| SleepPacer::new(config.frame_period())),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "headless"
    }
}

/// Surface that keeps presented frames in memory
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Arc<HeadlessState>,
    region: PixelRegion,
    history: usize,
    pacer: Option<SleepPacer>,
    closed: bool,
}

impl DisplaySurface for HeadlessSurface {
    fn pixel_region(&self) -> PixelRegion {
        self.region
    }

    fn present(&mut self, pixels: &[u32]) -> Result<()> {
        if self.closed {
            return Err(GpuPortError::platform("surface is closed"));
        }
        let pending = self.state.fail_presents.load(Ordering::Relaxed);
        if pending > 0 {
            self.state.fail_presents.store(pending - 1, Ordering::Relaxed);
            return Err(GpuPortError::platform("injected present failure"));
        }
        let expected = self.region.width * self.region.height;
        if pixels.len() != expected {
            return Err(GpuPortError::invalid_parameter(
                "pixels",
                format!("frame has {} pixels, surface needs {}", pixels.len(), expected),
            ));
        }

        if self.history > 0 {
            let mut frames = self.state.frames.lock().unwrap_or_else(|e| e.into_inner());
            if frames.len() >= self.history {
                frames.remove(0);
            }
            frames.push(pixels.to_vec());
        }
        self.state.presents.fetch_add(1, Ordering::Relaxed);
        self.vsync()
    }

    fn vsync(&mut self) -> Result<()> {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> DisplaySurfaceConfig {
        DisplaySurfaceConfig::new(2_500_000, 72, 71, 6, 4)
    }

    #[test]
    fn test_present_records_frames() {
        let mut backend = HeadlessBackend::new().with_history(2);
        let mut surface = backend.open(&tiny()).unwrap();
        assert_eq!(surface.pixel_region().width, 71);

        for i in 0..3u32 {
            surface.present(&vec![i; 71 * 4]).unwrap();
        }
        assert_eq!(backend.present_count(), 3);
        let frames = backend.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][0], 2);
    }

    #[test]
    fn test_injected_failures() {
        let mut backend = HeadlessBackend::new();
        backend.fail_open(true);
        assert!(backend.open(&tiny()).is_err());
        backend.fail_open(false);

        let mut surface = backend.open(&tiny()).unwrap();
        backend.fail_presents(1);
        assert!(surface.present(&vec![0; 71 * 4]).is_err());
        assert!(surface.present(&vec![0; 71 * 4]).is_ok());
        assert!(surface.present(&[0; 3]).is_err());

        surface.close();
        assert_eq!(backend.close_count(), 1);
        drop(surface);
        assert_eq!(backend.close_count(), 1);
    }
}
