//! Shared session layout: header, node cells and index math
//!
//! A session region is laid out as:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────────────┐
//! │ SessionHeader                │ node cells (AtomicU32)               │
//! │ geometry, owner, sync words, │ universe 0 │ universe 1 │ ...        │
//! │ stats, dirty-row bitmap      │ (each padded to a cache line)        │
//! └──────────────────────────────┴──────────────────────────────────────┘
//! ```

pub mod constants;
pub mod headers;
pub mod index;

pub use constants::*;
pub use headers::{DirtyRows, SessionGeometry, SessionHeader, SyncWords};
pub use index::{FrameLayout, NodeLayout};

/// Byte offsets of the parts of a session region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLayout {
    pub nodes: NodeLayout,
    pub cells_offset: usize,
    pub total_size: usize,
}

impl SessionLayout {
    pub fn new(num_universes: usize, universe_len: usize) -> Self {
        let nodes = NodeLayout::new(num_universes, universe_len);
        let cells_offset = round_up(std::mem::size_of::<SessionHeader>(), CACHE_LINE_SIZE);
        Self {
            nodes,
            cells_offset,
            total_size: cells_offset + nodes.byte_len(),
        }
    }

    pub fn geometry(&self) -> SessionGeometry {
        SessionGeometry {
            num_universes: self.nodes.num_universes() as u32,
            universe_len: self.nodes.universe_len() as u32,
            stride: self.nodes.stride() as u32,
        }
    }
}
