//! Frame production, run only by the session owner

use std::time::{Duration, Instant};

use crate::color::NodeColor;
use crate::display::{DisplayBackend, DisplaySurface, DisplaySurfaceConfig};
use crate::encoder::{EncodedFrame, Encoder, PivotCache, Protocol};
use crate::error::{GpuPortError, Result, SoftError};
use crate::layout::DIRTY_WORDS;
use crate::node_buffer::NodeBuffer;

/// Display and encoder state that exists only in the owner's process
pub(crate) struct OwnerState {
    backend: Box<dyn DisplayBackend>,
    surface: Option<Box<dyn DisplaySurface>>,
    display: DisplaySurfaceConfig,
    encoder: Encoder,
    pivot: Option<PivotCache>,
    snapshot: Vec<NodeColor>,
    frame: EncodedFrame,
}

impl OwnerState {
    pub(crate) fn new(
        backend: Box<dyn DisplayBackend>,
        display: DisplaySurfaceConfig,
        encoder: Encoder,
        use_pivot: bool,
    ) -> Self {
        let pivot = (use_pivot && encoder.protocol() == Protocol::Ws281x)
            .then(|| encoder.new_pivot_cache());
        Self {
            backend,
            surface: None,
            display,
            frame: encoder.new_frame(),
            encoder,
            pivot,
            snapshot: Vec::new(),
        }
    }

    /// Open the display on first use; any failure here is fatal
    pub(crate) fn ensure_surface(&mut self) -> Result<()> {
        if self.surface.is_some() {
            return Ok(());
        }
        let surface = self.backend.open(&self.display).map_err(|e| {
            log::error!("Opening {} display failed: {}", self.backend.name(), e);
            e
        })?;

        let region = surface.pixel_region();
        let layout = self.frame.layout();
        if region.width != layout.width() || region.height != layout.height() {
            return Err(GpuPortError::mode_mismatch(format!(
                "surface is {}x{}, encoder produces {}x{}",
                region.width,
                region.height,
                layout.width(),
                layout.height()
            )));
        }

        log::info!(
            "Opened {} display {}x{} at {:.2} fps",
            self.backend.name(),
            region.width,
            region.height,
            self.display.fps()
        );
        self.surface = Some(surface);
        Ok(())
    }

    /// Capture the buffer contents this frame will show; returns rows refreshed
    pub(crate) fn snapshot(&mut self, buffer: &NodeBuffer<'_>) -> u64 {
        match self.pivot.as_mut() {
            Some(pivot) => pivot.refresh(buffer) as u64,
            None => {
                let dirty = buffer.dirty();
                let rows: u32 = (0..DIRTY_WORDS)
                    .map(|word| dirty.take_word(word).count_ones())
                    .sum();
                buffer.snapshot_into(&mut self.snapshot);
                rows as u64
            }
        }
    }

    pub(crate) fn encode(&mut self) {
        match self.pivot.as_ref() {
            Some(pivot) => self.encoder.encode_frame_pivot(pivot, &mut self.frame),
            None => self
                .encoder
                .encode_frame_direct(&self.snapshot, &mut self.frame),
        }
    }

    /// Hand the encoded frame to the display. Failures are soft: the frame is dropped.
    pub(crate) fn present(&mut self, frame_number: u32) -> std::result::Result<(), SoftError> {
        let surface = self.surface.as_mut().ok_or_else(|| SoftError::PresentFailed {
            frame: frame_number,
            message: "display not open".to_string(),
        })?;
        surface
            .present(self.frame.pixels())
            .map_err(|e| SoftError::PresentFailed {
                frame: frame_number,
                message: e.to_string(),
            })
    }

    pub(crate) fn frame(&self) -> &EncodedFrame {
        &self.frame
    }

    pub(crate) fn frame_period(&self) -> Duration {
        self.encoder.timing().frame_period()
    }
}

impl Drop for OwnerState {
    fn drop(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.close();
        }
    }
}

/// Measures consecutive stages of one frame cycle
pub(crate) struct StageClock {
    last: Instant,
}

impl StageClock {
    pub(crate) fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Time since the previous lap
    pub(crate) fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.last;
        self.last = now;
        elapsed
    }
}
