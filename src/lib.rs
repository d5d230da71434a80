//! # GpuPort - WS281X signal generation from a video scan-out
//!
//! GpuPort drives up to 24 strings ("universes") of WS281X LEDs in parallel by
//! treating a display output as a precisely clocked signal generator. Every
//! scan line carries one node per universe: the 24 color bits are split into
//! lead, data and trail slices, and output line `u` is bit `u` of each pixel.
//!
//! ## Features
//!
//! - **Shared node buffer**: producers in any thread or process write their
//!   universes directly into one memory-mapped session
//! - **Single owner**: the first attach owns the display; everyone else only
//!   marks universes ready
//! - **Cross-process frame sync**: ready mask and frame counter with futex
//!   wake-ups, no ABA on completion
//! - **Brightness limiting**: R+G+B capped per node, hue preserved
//! - **Dirty-row pivot cache**: only changed rows are re-transposed per frame
//! - **Pluggable displays**: Linux framebuffer or an in-memory headless surface
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────── shared session region ─────────────────────────────┐
//! │ SessionHeader: geometry │ owner │ ready mask │ frame counter │ stats │ dirty rows │
//! │ NodeBuffer: universe 0 │ universe 1 │ ...                                         │
//! └─────────────────────────────────────────────────────────────────────────────────┘
//!        ▲ fill / set_pixel / ready                      │ snapshot (owner only)
//!  ┌─────┴──────┐                                  ┌─────▼─────┐    ┌──────────────┐
//!  │  GpuPort   │ ... one per thread or process    │  Encoder  │───▶│DisplaySurface│
//!  └────────────┘                                  └───────────┘    └──────────────┘
//! ```

pub mod color;
pub mod display;
pub mod encoder;
pub mod error;
pub mod layout;
pub mod memory;
pub mod node_buffer;
pub mod port;
pub mod stats;
pub mod sync;

// Main API re-exports
pub use color::{BlendMode, NodeColor, DEFAULT_BRIGHTNESS_CEILING};
pub use display::{
    ChannelOrder, DisplayBackend, DisplaySurface, DisplaySurfaceConfig, Endian, HeadlessBackend,
    PixelFormat, PixelRegion,
};
#[cfg(target_os = "linux")]
pub use display::FramebufferBackend;
pub use encoder::{BitTiming, EncodedFrame, Encoder, PivotCache, Protocol};
pub use error::{GpuPortError, Result, SoftError};
pub use layout::{MAX_UNIVERSES, MAX_UNIVERSE_LEN, NODE_BITS};
pub use memory::{FileBackedProvider, SharedAllocation, SharedHandle, SharedMemoryProvider};
pub use node_buffer::NodeBuffer;
pub use port::{GpuPort, GpuPortConfig, OutOfRangePolicy, Region};
pub use stats::FrameStats;
pub use sync::SyncPolicy;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
