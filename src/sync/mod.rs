//! Cross-process frame synchronization
//!
//! - `futex`: wait/wake on shared 32-bit words (Linux futex, polling elsewhere)
//! - `frame_sync`: the ready-mask / frame-counter protocol

pub mod frame_sync;
pub mod futex;

pub use frame_sync::{FrameSync, Submission};
pub use futex::WaitOutcome;

use serde::{Deserialize, Serialize};

/// When the owner releases producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Release after the frame has been presented
    #[default]
    Lockstep,
    /// Release once the node buffer has been snapshotted, so producers render
    /// the next frame while this one is encoded and presented
    RenderAhead,
}
