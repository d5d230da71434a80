//! One attach to a shared session region

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::color::NodeColor;
use crate::error::{GpuPortError, Result};
use crate::layout::{SessionHeader, SessionLayout};
use crate::memory::{SharedHandle, SharedMemoryProvider};
use crate::node_buffer::NodeBuffer;
use crate::sync::FrameSync;

/// Interval at which a later attacher re-checks for a published header
const PUBLISH_POLL: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub(crate) struct Session {
    handle: SharedHandle,
    layout: SessionLayout,
    attach_id: u32,
    is_owner: bool,
    existed_already: bool,
}

impl Session {
    /// Attach to `key`, creating and initializing the session if no attach is live.
    ///
    /// The creator fills in the header and the cells and publishes the magic
    /// last. Later attachers wait up to `publish_timeout` for that and then
    /// verify the geometry matches.
    pub(crate) fn attach(
        provider: &dyn SharedMemoryProvider,
        key: &str,
        layout: SessionLayout,
        init_color: NodeColor,
        publish_timeout: Duration,
    ) -> Result<Self> {
        let allocation = provider.alloc(key, layout.total_size)?;
        if allocation.handle.len() < layout.total_size {
            return Err(GpuPortError::memory(format!(
                "Shared region {} has {} bytes, session needs {}",
                key,
                allocation.handle.len(),
                layout.total_size
            )));
        }

        let mut session = Self {
            handle: allocation.handle,
            layout,
            attach_id: 0,
            is_owner: false,
            existed_already: allocation.existed_already,
        };

        if allocation.existed_already {
            session.join(publish_timeout)?;
        } else {
            session.create(init_color);
        }

        log::info!(
            "{} session {:?}: {} x {} nodes, attach id {}, attach count {}",
            if session.is_owner { "Created" } else { "Joined" },
            key,
            layout.nodes.num_universes(),
            layout.nodes.universe_len(),
            session.attach_id,
            allocation.attach_count
        );
        Ok(session)
    }

    fn create(&mut self, init_color: NodeColor) {
        let header = self.header();
        let attach_id = header.initialize(self.layout.geometry());
        self.buffer().reset(init_color);
        self.header().publish();
        self.attach_id = attach_id;
        self.is_owner = true;
    }

    fn join(&mut self, publish_timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + publish_timeout;
        while !self.header().is_published() {
            if Instant::now() >= deadline {
                return Err(GpuPortError::session_mismatch(format!(
                    "session {:?} was never initialized by its creator",
                    self.handle.key()
                )));
            }
            std::thread::sleep(PUBLISH_POLL);
        }

        let header = self.header();
        header.validate()?;
        header.check_geometry(self.layout.geometry())?;
        let attach_id = header.next_attach_id();
        let owner_id = header.owner_id.load(Ordering::Relaxed);
        self.attach_id = attach_id;
        self.is_owner = attach_id == owner_id;
        Ok(())
    }

    pub(crate) fn header(&self) -> &SessionHeader {
        // SAFETY: the region is at least `total_size` bytes, 64-byte aligned,
        // and a zeroed SessionHeader is valid (all fields are atomics).
        unsafe { &*(self.handle.as_ptr() as *const SessionHeader) }
    }

    fn cells(&self) -> &[AtomicU32] {
        // SAFETY: cells_offset is cache-line aligned and the cells fit in the region
        unsafe {
            std::slice::from_raw_parts(
                self.handle.as_ptr().add(self.layout.cells_offset) as *const AtomicU32,
                self.layout.nodes.total_cells(),
            )
        }
    }

    pub(crate) fn buffer(&self) -> NodeBuffer<'_> {
        NodeBuffer::new(self.cells(), &self.header().dirty, self.layout.nodes)
    }

    pub(crate) fn frame_sync(&self) -> FrameSync<'_> {
        FrameSync::new(&self.header().sync, self.layout.nodes.all_universes_mask())
    }

    pub(crate) fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub(crate) fn attach_id(&self) -> u32 {
        self.attach_id
    }

    pub(crate) fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub(crate) fn existed_already(&self) -> bool {
        self.existed_already
    }

    pub(crate) fn attach_count(&self) -> u32 {
        self.handle.attach_count()
    }

    pub(crate) fn key(&self) -> &str {
        self.handle.key()
    }
}
