//! WS281X protocol encoder
//!
//! - `timing`: slice geometry derived from the display mode
//! - `encode`: row and frame encoding, the reference direct-gather path
//! - `pivot`: dirty-row cache of transposed rows, the fast path
//!
//! Both frame paths produce byte-identical output for the same buffer state.

pub mod encode;
pub mod pivot;
pub mod timing;

pub use encode::{
    encode_row, line_masks, wire_value, write_preview_row, write_row, EncodedFrame, Encoder,
    LineMasks, Protocol, ALL_LINES_OFF, ALL_LINES_ON,
};
pub use pivot::PivotCache;
pub use timing::{BitTiming, RESET_MIN_US, SLICE_MAX_NS, SLICE_MIN_NS};
