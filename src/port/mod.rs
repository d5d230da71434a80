//! GpuPort facade
//!
//! A `GpuPort` is one attach to a shared session. The first attach creates the
//! session and becomes its owner: only the owner opens the display, encodes
//! and presents. Every attach may write nodes and call [`GpuPort::ready`].
//!
//! ```text
//!  producer A ─ fill ─ ready(0b0001) ─┐
//!  producer B ─ fill ─ ready(0b0110) ─┼─▶ owner: all ready ─▶ snapshot ─▶ encode ─▶ present
//!  owner      ─ fill ─ ready(0b1000) ─┘                   └─▶ clear mask, frame += 1, wake
//! ```

pub mod config;
mod owner;
mod session;

pub use config::{GpuPortConfig, OutOfRangePolicy, Region};

use std::time::{Duration, Instant};

use crate::color::NodeColor;
use crate::display::DisplayBackend;
use crate::encoder::Encoder;
use crate::error::{Result, SoftError};
use crate::layout::SessionLayout;
use crate::memory::{FileBackedProvider, SharedMemoryProvider};
use crate::stats::{FrameStats, StageTimings};
use crate::sync::SyncPolicy;

use owner::{OwnerState, StageClock};
use session::Session;

pub struct GpuPort {
    // Dropped before the session so the display closes before detaching
    owner: Option<OwnerState>,
    session: Session,
    config: GpuPortConfig,
}

impl GpuPort {
    /// Attach to (or create) the session named by `config.session_key`.
    ///
    /// The configuration, including the display timing, is validated before
    /// shared memory or the display is touched. The display itself is opened
    /// lazily by the owner's first `ready()`.
    pub fn construct(
        config: GpuPortConfig,
        provider: &dyn SharedMemoryProvider,
        backend: impl DisplayBackend + 'static,
    ) -> Result<Self> {
        let timing = config.validate().map_err(|e| {
            log::error!("Invalid GpuPort config for {:?}: {}", config.session_key, e);
            e
        })?;

        let layout = SessionLayout::new(config.num_universes, config.universe_len);
        let session = Session::attach(
            provider,
            &config.session_key,
            layout,
            config.init_color.limit(config.brightness_ceiling),
            config.attach_timeout(),
        )?;

        let owner = session.is_owner().then(|| {
            let encoder = Encoder::new(
                timing,
                layout.nodes,
                config.display.pixel_format,
                config.protocol,
                config.brightness_ceiling,
            )
            .with_rg_swap(config.rg_swap);
            OwnerState::new(
                Box::new(backend),
                config.display.clone(),
                encoder,
                config.use_pivot,
            )
        });

        if owner.is_none() && config.owned_universes.is_none() {
            log::warn!(
                "Attach {} to {:?} owns no universes; fill without a region writes nothing",
                session.attach_id(),
                config.session_key
            );
        }

        Ok(Self {
            owner,
            session,
            config,
        })
    }

    /// Attach using the default shared memory directory and, on Linux, the
    /// console framebuffer
    pub fn open(config: GpuPortConfig) -> Result<Self> {
        let provider = FileBackedProvider::default();
        #[cfg(target_os = "linux")]
        let backend = crate::display::FramebufferBackend::new();
        #[cfg(not(target_os = "linux"))]
        let backend = crate::display::HeadlessBackend::new();
        Self::construct(config, &provider, backend)
    }

    pub fn config(&self) -> &GpuPortConfig {
        &self.config
    }

    pub fn is_owner(&self) -> bool {
        self.session.is_owner()
    }

    /// False if this attach created the session
    pub fn existed_already(&self) -> bool {
        self.session.existed_already()
    }

    pub fn attach_id(&self) -> u32 {
        self.session.attach_id()
    }

    /// Attaches currently live across all processes
    pub fn attach_count(&self) -> u32 {
        self.session.attach_count()
    }

    pub fn num_universes(&self) -> usize {
        self.session.layout().nodes.num_universes()
    }

    pub fn universe_len(&self) -> usize {
        self.session.layout().nodes.universe_len()
    }

    pub fn all_universes_mask(&self) -> u32 {
        self.session.layout().nodes.all_universes_mask()
    }

    /// Frames completed in this session
    pub fn frame_count(&self) -> u32 {
        self.session.frame_sync().frame_counter()
    }

    /// Default `fill` region: the configured universes, else everything for
    /// the owner and nothing for other attaches
    fn owned_mask(&self) -> u32 {
        match self.config.owned_universes {
            Some(mask) => mask,
            None if self.is_owner() => self.all_universes_mask(),
            None => 0,
        }
    }

    /// Apply the out-of-range policy; `Ok` means the in-range part is still written
    fn out_of_range(&self, universe: usize, node: usize) -> std::result::Result<(), SoftError> {
        let err = SoftError::out_of_range(universe, node, self.num_universes(), self.universe_len());
        match self.config.out_of_range {
            OutOfRangePolicy::Strict => Err(err),
            OutOfRangePolicy::ClipWithWarning => {
                err.log();
                Ok(())
            }
            OutOfRangePolicy::SilentClip => Ok(()),
        }
    }

    /// Brightness-limit `color` and write it under the configured blend mode
    /// to `region`, or to this attach's owned universes when `region` is `None`.
    ///
    /// Returns the number of cells written. Never blocks.
    pub fn fill(&self, color: NodeColor, region: Option<Region>) -> std::result::Result<usize, SoftError> {
        let color = color.limit(self.config.brightness_ceiling);
        let mode = self.config.blend_mode;
        let buffer = self.session.buffer();
        let len = self.universe_len();

        let Some(region) = region else {
            let owned = self.owned_mask();
            let mut written = 0;
            for universe in (0..self.num_universes()).filter(|u| owned & (1 << u) != 0) {
                written += buffer.write_rect(universe..universe + 1, 0..len, color, mode);
            }
            return Ok(written);
        };

        let nodes = region.nodes.clone().unwrap_or(0..len);
        if region.universes.end > self.num_universes() || nodes.end > len {
            self.out_of_range(
                region.universes.end.saturating_sub(1),
                nodes.end.saturating_sub(1),
            )?;
        }
        let universes = region.universes.start..region.universes.end.min(self.num_universes());
        let nodes = nodes.start..nodes.end.min(len);
        if universes.is_empty() || nodes.is_empty() {
            return Ok(0);
        }
        Ok(buffer.write_rect(universes, nodes, color, mode))
    }

    /// Write one node under the configured blend mode and return its previous color.
    ///
    /// A clipped (out-of-range) write changes nothing and returns
    /// [`NodeColor::NONE`].
    pub fn set_pixel(
        &self,
        universe: usize,
        index: usize,
        color: NodeColor,
    ) -> std::result::Result<NodeColor, SoftError> {
        let color = color.limit(self.config.brightness_ceiling);
        match self
            .session
            .buffer()
            .write(universe, index, color, self.config.blend_mode)
        {
            Some(prev) => Ok(prev),
            None => {
                self.out_of_range(universe, index)?;
                Ok(NodeColor::NONE)
            }
        }
    }

    pub fn get_pixel(&self, universe: usize, index: usize) -> Option<NodeColor> {
        self.session.buffer().get(universe, index)
    }

    /// Mark `mask` universes ready and wait for the frame to complete.
    ///
    /// Producers return once the owner has advanced the frame counter. The
    /// owner waits for every universe, then encodes and presents. Returns
    /// whether the caller may go on to prepare the next frame.
    pub fn ready(&mut self, mask: u32) -> Result<bool> {
        self.ready_until(mask, None)
    }

    /// As [`GpuPort::ready`], giving up after `timeout`. Expiry is a soft
    /// failure: it is logged and `Ok(false)` is returned; the submitted bits
    /// stay set for the current frame.
    pub fn ready_timeout(&mut self, mask: u32, timeout: Duration) -> Result<bool> {
        self.ready_until(mask, Some(Instant::now() + timeout))
    }

    fn ready_until(&mut self, mask: u32, deadline: Option<Instant>) -> Result<bool> {
        let mask = mask & self.all_universes_mask();
        if self.owner.is_some() {
            self.owner_cycle(mask, deadline)
        } else {
            self.producer_wait(mask, deadline)
        }
    }

    fn producer_wait(&self, mask: u32, deadline: Option<Instant>) -> Result<bool> {
        let sync = self.session.frame_sync();
        let started = Instant::now();
        let submission = sync.submit(mask);
        if submission.completed {
            log::trace!("Attach {} completed frame {}", self.attach_id(), submission.seen_frame + 1);
        }
        if sync.wait_frame_advance(submission.seen_frame, deadline) {
            return Ok(true);
        }
        self.soft_timeout("frame advance", started);
        Ok(false)
    }

    fn owner_cycle(&mut self, mask: u32, deadline: Option<Instant>) -> Result<bool> {
        let Some(owner) = self.owner.as_mut() else {
            return Ok(false);
        };
        owner.ensure_surface()?;

        let sync = self.session.frame_sync();
        let mut clock = StageClock::start();
        sync.submit(mask);
        if !sync.wait_all_ready(deadline) {
            let waited = clock.lap();
            let err = SoftError::Timeout {
                what: "all universes ready".to_string(),
                waited_ms: waited.as_millis() as u64,
            };
            err.log();
            self.session.header().stats.record_error();
            return Ok(false);
        }
        let mut timings = StageTimings {
            wait: clock.lap(),
            ..Default::default()
        };

        let buffer = self.session.buffer();
        timings.dirty_rows = owner.snapshot(&buffer);
        timings.snapshot = clock.lap();

        let frame_number = sync.frame_counter().wrapping_add(1);
        let render_ahead = self.config.sync_policy == SyncPolicy::RenderAhead;
        if render_ahead {
            sync.complete_frame();
        }

        owner.encode();
        timings.encode = clock.lap();

        if let Err(err) = owner.present(frame_number) {
            err.log();
            self.session.header().stats.record_error();
        }
        timings.present = clock.lap();

        if !render_ahead {
            sync.complete_frame();
        }
        self.session.header().stats.record(&timings);
        log::trace!(
            "Frame {}: wait {:?}, snapshot {:?} ({} rows), encode {:?}, present {:?}",
            frame_number,
            timings.wait,
            timings.snapshot,
            timings.dirty_rows,
            timings.encode,
            timings.present
        );
        Ok(true)
    }

    fn soft_timeout(&self, what: &str, started: Instant) {
        SoftError::Timeout {
            what: what.to_string(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
        .log();
        self.session.header().stats.record_error();
    }

    /// Lock-free, eventually-consistent statistics for diagnostics
    pub fn stats(&self) -> FrameStats {
        self.session.header().stats.snapshot(self.frame_count())
    }

    /// Zero the timing accumulators for every attach
    pub fn reset_stats(&self) -> bool {
        self.session.header().stats.reset()
    }

    /// Pixels of the most recently encoded frame (owner only)
    pub fn encoded_frame(&self) -> Option<&[u32]> {
        self.owner.as_ref().map(|owner| owner.frame().pixels())
    }

    /// Scan-out period of the configured display mode
    pub fn frame_period(&self) -> Duration {
        match self.owner.as_ref() {
            Some(owner) => owner.frame_period(),
            None => self.config.display.frame_period(),
        }
    }
}

impl Drop for GpuPort {
    fn drop(&mut self) {
        log::debug!(
            "Detaching attach {} from session {:?} ({} frames)",
            self.attach_id(),
            self.session.key(),
            self.frame_count()
        );
    }
}

impl std::fmt::Debug for GpuPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuPort")
            .field("session", &self.session.key())
            .field("attach_id", &self.attach_id())
            .field("owner", &self.is_owner())
            .field("universes", &self.num_universes())
            .field("universe_len", &self.universe_len())
            .field("frames", &self.frame_count())
            .finish()
    }
}
