//! Frame timing statistics
//!
//! [`SharedFrameStats`] lives inside the session header so every attached
//! process sees the same numbers. Only the owner records into it. Readers take
//! a lock-free, eventually-consistent [`FrameStats`] snapshot; the coarse lock
//! only keeps a reset from interleaving with a record.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Attempts before a stats update gives up on the lock
const LOCK_SPIN_LIMIT: u32 = 10_000;

/// Elapsed time of each stage of one owner frame cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// Waiting for all universes to become ready
    pub wait: Duration,
    /// Snapshot of the node buffer (pivot refresh or cell copy)
    pub snapshot: Duration,
    /// Bit-pattern encoding
    pub encode: Duration,
    /// Present plus vsync
    pub present: Duration,
    /// Rows recomputed by the pivot cache
    pub dirty_rows: u64,
}

/// Shared accumulators, laid out for placement in shared memory
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct SharedFrameStats {
    lock: AtomicU32,
    num_errors: AtomicU32,
    frames_timed: AtomicU64,
    wait_ns: AtomicU64,
    snapshot_ns: AtomicU64,
    encode_ns: AtomicU64,
    present_ns: AtomicU64,
    num_dirty: AtomicU64,
    first_frame_ns: AtomicU64,
    last_frame_ns: AtomicU64,
}

struct StatsGuard<'a> {
    lock: &'a AtomicU32,
}

impl Drop for StatsGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(0, Ordering::Release);
    }
}

fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl SharedFrameStats {
    fn try_lock(&self) -> Option<StatsGuard<'_>> {
        for _ in 0..LOCK_SPIN_LIMIT {
            if self
                .lock
                .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(StatsGuard { lock: &self.lock });
            }
            std::thread::yield_now();
        }
        None
    }

    /// Add one completed frame cycle
    pub fn record(&self, timings: &StageTimings) {
        let Some(_guard) = self.try_lock() else {
            log::debug!("Stats lock busy, dropping frame timings");
            return;
        };
        let now = wall_clock_ns();
        let _ = self
            .first_frame_ns
            .compare_exchange(0, now, Ordering::Relaxed, Ordering::Relaxed);
        self.last_frame_ns.store(now, Ordering::Relaxed);
        self.frames_timed.fetch_add(1, Ordering::Relaxed);
        self.wait_ns
            .fetch_add(timings.wait.as_nanos() as u64, Ordering::Relaxed);
        self.snapshot_ns
            .fetch_add(timings.snapshot.as_nanos() as u64, Ordering::Relaxed);
        self.encode_ns
            .fetch_add(timings.encode.as_nanos() as u64, Ordering::Relaxed);
        self.present_ns
            .fetch_add(timings.present.as_nanos() as u64, Ordering::Relaxed);
        self.num_dirty
            .fetch_add(timings.dirty_rows, Ordering::Relaxed);
    }

    /// Count a soft failure during frame production
    pub fn record_error(&self) {
        self.num_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Lock-free read of the current totals
    pub fn snapshot(&self, frame_count: u32) -> FrameStats {
        let first = self.first_frame_ns.load(Ordering::Relaxed);
        let last = self.last_frame_ns.load(Ordering::Relaxed);
        let frames_timed = self.frames_timed.load(Ordering::Relaxed);
        let fps = if frames_timed > 1 && last > first {
            (frames_timed - 1) as f64 * 1e9 / (last - first) as f64
        } else {
            0.0
        };

        FrameStats {
            frame_count,
            frames_timed,
            wait: Duration::from_nanos(self.wait_ns.load(Ordering::Relaxed)),
            snapshot: Duration::from_nanos(self.snapshot_ns.load(Ordering::Relaxed)),
            encode: Duration::from_nanos(self.encode_ns.load(Ordering::Relaxed)),
            present: Duration::from_nanos(self.present_ns.load(Ordering::Relaxed)),
            num_errors: self.num_errors.load(Ordering::Relaxed),
            num_dirty: self.num_dirty.load(Ordering::Relaxed),
            fps,
        }
    }

    /// Zero all accumulators. Returns false if the lock could not be taken.
    pub fn reset(&self) -> bool {
        let Some(_guard) = self.try_lock() else {
            return false;
        };
        self.num_errors.store(0, Ordering::Relaxed);
        self.frames_timed.store(0, Ordering::Relaxed);
        self.wait_ns.store(0, Ordering::Relaxed);
        self.snapshot_ns.store(0, Ordering::Relaxed);
        self.encode_ns.store(0, Ordering::Relaxed);
        self.present_ns.store(0, Ordering::Relaxed);
        self.num_dirty.store(0, Ordering::Relaxed);
        self.first_frame_ns.store(0, Ordering::Relaxed);
        self.last_frame_ns.store(0, Ordering::Relaxed);
        true
    }
}

/// Point-in-time copy of the session statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Frames completed by the owner (the shared frame counter)
    pub frame_count: u32,
    /// Frames whose timings were recorded since the last reset
    pub frames_timed: u64,
    /// Total time spent waiting for producers
    pub wait: Duration,
    /// Total time spent taking buffer snapshots
    pub snapshot: Duration,
    /// Total time spent encoding
    pub encode: Duration,
    /// Total time spent in present and vsync
    pub present: Duration,
    /// Soft failures while producing frames
    pub num_errors: u32,
    /// Rows recomputed by the pivot cache
    pub num_dirty: u64,
    /// Observed frame rate
    pub fps: f64,
}

impl FrameStats {
    fn average(&self, total: Duration) -> Duration {
        if self.frames_timed == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((total.as_nanos() / self.frames_timed as u128) as u64)
    }

    pub fn avg_wait(&self) -> Duration {
        self.average(self.wait)
    }

    pub fn avg_snapshot(&self) -> Duration {
        self.average(self.snapshot)
    }

    pub fn avg_encode(&self) -> Duration {
        self.average(self.encode)
    }

    pub fn avg_present(&self) -> Duration {
        self.average(self.present)
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "FrameStats {{ frames: {}, errors: {}, dirty rows: {}, fps: {:.2}, \
             avg wait: {:?}, avg snapshot: {:?}, avg encode: {:?}, avg present: {:?} }}",
            self.frame_count,
            self.num_errors,
            self.num_dirty,
            self.fps,
            self.avg_wait(),
            self.avg_snapshot(),
            self.avg_encode(),
            self.avg_present()
        )
    }
}
