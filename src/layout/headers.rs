//! Header structure at the start of each session region

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::constants::*;
use crate::error::{GpuPortError, Result};
use crate::stats::SharedFrameStats;

/// Words the frame sync protocol waits on, kept on their own cache line
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct SyncWords {
    /// One bit per universe, set by `ready()` and cleared by the owner
    pub ready_mask: AtomicU32,
    /// Frames completed so far; only the owner increments it
    pub frame_counter: AtomicU32,
}

/// Rows written since the owner last refreshed its pivot cache
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct DirtyRows {
    pub words: [AtomicU64; DIRTY_WORDS],
}

impl DirtyRows {
    /// Flag one row (node position) as changed
    #[inline]
    pub fn mark(&self, row: usize) {
        self.words[row / 64].fetch_or(1 << (row % 64), Ordering::Release);
    }

    /// Flag `rows` as changed, one RMW per touched word
    pub fn mark_range(&self, rows: std::ops::Range<usize>) {
        let mut row = rows.start;
        while row < rows.end {
            let word = row / 64;
            let lo = row % 64;
            let hi = (rows.end - word * 64).min(64);
            let bits = if hi - lo == 64 {
                u64::MAX
            } else {
                ((1u64 << (hi - lo)) - 1) << lo
            };
            self.words[word].fetch_or(bits, Ordering::Release);
            row = word * 64 + hi;
        }
    }

    /// Flag every row
    pub fn mark_all(&self) {
        for word in &self.words {
            word.store(u64::MAX, Ordering::Release);
        }
    }

    /// Atomically take and clear one word of flags
    #[inline]
    pub fn take_word(&self, word: usize) -> u64 {
        self.words[word].swap(0, Ordering::AcqRel)
    }

    /// Number of rows currently flagged
    pub fn count(&self) -> u32 {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones())
            .sum()
    }
}

/// Session header shared by all attached processes.
///
/// Every field is atomic so that attachers can hold a shared reference while
/// the creator is still filling it in. `magic` is stored last with release
/// ordering; a reader that observes it with acquire ordering sees the rest.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SessionHeader {
    pub magic: AtomicU64,
    pub version: AtomicU32,
    pub num_universes: AtomicU32,
    pub universe_len: AtomicU32,
    pub stride: AtomicU32,
    /// Attach id of the owner, fixed at creation
    pub owner_id: AtomicU32,
    pub owner_pid: AtomicU32,
    pub next_attach_id: AtomicU32,
    _reserved: AtomicU32,
    pub creation_time: AtomicU64,
    pub sync: SyncWords,
    pub stats: SharedFrameStats,
    pub dirty: DirtyRows,
}

/// Session geometry as recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGeometry {
    pub num_universes: u32,
    pub universe_len: u32,
    pub stride: u32,
}

impl SessionHeader {
    /// First phase of two-phase init, run only by the creator on zeroed memory.
    ///
    /// Returns the owner's attach id. The header is not valid for other
    /// attachers until [`SessionHeader::publish`] runs.
    pub fn initialize(&self, geometry: SessionGeometry) -> u32 {
        let owner_id = self.next_attach_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.version.store(SCHEMA_VERSION, Ordering::Relaxed);
        self.num_universes
            .store(geometry.num_universes, Ordering::Relaxed);
        self.universe_len.store(geometry.universe_len, Ordering::Relaxed);
        self.stride.store(geometry.stride, Ordering::Relaxed);
        self.owner_id.store(owner_id, Ordering::Relaxed);
        self.owner_pid.store(std::process::id(), Ordering::Relaxed);
        self.creation_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            Ordering::Relaxed,
        );
        self.sync.ready_mask.store(0, Ordering::Relaxed);
        self.sync.frame_counter.store(0, Ordering::Relaxed);
        owner_id
    }

    /// Second phase: make the header visible to other attachers
    pub fn publish(&self) {
        self.magic.store(SESSION_MAGIC, Ordering::Release);
    }

    pub fn is_published(&self) -> bool {
        self.magic.load(Ordering::Acquire) == SESSION_MAGIC
    }

    /// Hand out a new attach id to a later attacher
    pub fn next_attach_id(&self) -> u32 {
        self.next_attach_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn geometry(&self) -> SessionGeometry {
        SessionGeometry {
            num_universes: self.num_universes.load(Ordering::Relaxed),
            universe_len: self.universe_len.load(Ordering::Relaxed),
            stride: self.stride.load(Ordering::Relaxed),
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic.load(Ordering::Acquire) != SESSION_MAGIC {
            return Err(GpuPortError::invalid_parameter("magic", "Invalid magic number"));
        }
        let version = self.version.load(Ordering::Relaxed);
        if version != SCHEMA_VERSION {
            return Err(GpuPortError::session_mismatch(format!(
                "layout version {} not supported (expected {})",
                version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    /// Check that a later attacher asked for the same geometry as the creator
    pub fn check_geometry(&self, wanted: SessionGeometry) -> Result<()> {
        let actual = self.geometry();
        if actual != wanted {
            return Err(GpuPortError::session_mismatch(format!(
                "session is {} x {} (stride {}), requested {} x {} (stride {})",
                actual.num_universes,
                actual.universe_len,
                actual.stride,
                wanted.num_universes,
                wanted.universe_len,
                wanted.stride
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> SessionGeometry {
        SessionGeometry {
            num_universes: 4,
            universe_len: 5,
            stride: 16,
        }
    }

    #[test]
    fn test_header_alignment() {
        assert_eq!(std::mem::align_of::<SyncWords>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::size_of::<SessionHeader>() % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn test_two_phase_init() {
        let header = SessionHeader::default();
        assert!(header.validate().is_err());

        let owner = header.initialize(geometry());
        assert_eq!(owner, 1);
        assert!(!header.is_published());

        header.publish();
        assert!(header.validate().is_ok());
        assert_eq!(header.next_attach_id(), 2);
        assert_eq!(header.owner_id.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_geometry_mismatch() {
        let header = SessionHeader::default();
        header.initialize(geometry());
        header.publish();
        assert!(header.check_geometry(geometry()).is_ok());

        let other = SessionGeometry {
            universe_len: 6,
            ..geometry()
        };
        assert!(matches!(
            header.check_geometry(other),
            Err(GpuPortError::SessionMismatch { .. })
        ));
    }

    #[test]
    fn test_dirty_rows() {
        let dirty = DirtyRows::default();
        dirty.mark(3);
        dirty.mark_range(60..130);
        assert_eq!(dirty.count(), 71);
        assert_eq!(dirty.take_word(0), (1 << 3) | (0xF << 60));
        assert_eq!(dirty.take_word(1), u64::MAX);
        assert_eq!(dirty.take_word(2), 0b11);
        assert_eq!(dirty.count(), 0);

        dirty.mark_all();
        assert_eq!(dirty.count() as usize, MAX_UNIVERSE_LEN);
    }
}
