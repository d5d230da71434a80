//! Node colors to scan-out pixels
//!
//! A row of the encoded frame is one node position across all universes.
//! Output line `u` is bit `u` of the pixel's RGB value, so each pixel carries
//! the level of up to 24 lines at once. Per bit the row holds:
//!
//! ```text
//!   lead  | data               | trail
//!   all on | line u = bit of u | all off
//! ```

use serde::{Deserialize, Serialize};

use crate::color::NodeColor;
use crate::display::PixelFormat;
use crate::layout::{FrameLayout, NodeLayout, NODE_BITS};

use super::pivot::PivotCache;
use super::timing::BitTiming;

/// Every output line high
pub const ALL_LINES_ON: u32 = 0xFFFF_FFFF;

/// Every output line low (alpha stays opaque)
pub const ALL_LINES_OFF: u32 = 0xFF00_0000;

/// Line masks for one row, index 0 is the first (most significant) bit sent
pub type LineMasks = [u32; NODE_BITS];

/// Signal generated for the node buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Protocol {
    /// Development preview: raw colors as vertical bands, one per universe
    None,
    #[default]
    Ws281x,
}

/// The 24-bit value a node shifts out after limiting
#[inline]
pub fn wire_value(color: NodeColor, ceiling: u32, rg_swap: bool) -> u32 {
    let limited = color.limit(ceiling);
    if rg_swap {
        limited.rg_swapped().rgb24()
    } else {
        limited.rgb24()
    }
}

/// Transpose one row of node colors into per-bit line masks
pub fn line_masks(colors: &[NodeColor], ceiling: u32, rg_swap: bool) -> LineMasks {
    let mut masks = [0u32; NODE_BITS];
    for (universe, &color) in colors.iter().enumerate() {
        let value = wire_value(color, ceiling, rg_swap);
        for (bit, mask) in masks.iter_mut().enumerate() {
            if value & (1 << (NODE_BITS - 1 - bit)) != 0 {
                *mask |= 1 << universe;
            }
        }
    }
    masks
}

/// Write one scan row from its line masks
pub fn write_row(masks: &LineMasks, layout: &FrameLayout, format: PixelFormat, out: &mut [u32]) {
    let on = format.pack(ALL_LINES_ON);
    let off = format.pack(ALL_LINES_OFF);
    let slice_px = layout.slice_px();

    for (bit, &mask) in masks.iter().enumerate() {
        let data = format.pack(ALL_LINES_OFF | mask);
        for (sub, value) in [on, data, off].into_iter().enumerate() {
            let slice = FrameLayout::slice_index(bit, sub);
            let start = slice * slice_px;
            if start >= layout.visible_end() {
                break;
            }
            let end = (start + slice_px).min(layout.visible_end());
            out[start..end].fill(value);
        }
    }
    out[layout.visible_end()..layout.width()].fill(off);
}

/// Encode one row of node colors; pure and deterministic
pub fn encode_row(
    colors: &[NodeColor],
    timing: &BitTiming,
    format: PixelFormat,
    ceiling: u32,
    rg_swap: bool,
    out: &mut [u32],
) {
    let masks = line_masks(colors, ceiling, rg_swap);
    write_row(&masks, &timing.frame_layout(), format, out);
}

/// Preview row: the visible width split into one band per universe
pub fn write_preview_row(colors: &[NodeColor], ceiling: u32, layout: &FrameLayout, format: PixelFormat, out: &mut [u32]) {
    let off = format.pack(ALL_LINES_OFF);
    out.fill(off);
    if colors.is_empty() {
        return;
    }
    let band = layout.width() / colors.len();
    for (universe, color) in colors.iter().enumerate() {
        let value = format.pack(color.limit(ceiling).with_alpha(0xFF).0);
        out[universe * band..(universe + 1) * band].fill(value);
    }
}

/// Per-frame pixel buffer owned by the session owner
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pixels: Vec<u32>,
    layout: FrameLayout,
}

impl EncodedFrame {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            pixels: vec![0; layout.total_pixels()],
            layout,
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn row(&self, row: usize) -> &[u32] {
        &self.pixels[self.layout.row_span(row)]
    }

    fn row_mut(&mut self, row: usize) -> &mut [u32] {
        let span = self.layout.row_span(row);
        &mut self.pixels[span]
    }
}

/// Encoder settings fixed for the lifetime of a session
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    timing: BitTiming,
    nodes: NodeLayout,
    format: PixelFormat,
    protocol: Protocol,
    ceiling: u32,
    rg_swap: bool,
}

impl Encoder {
    pub fn new(timing: BitTiming, nodes: NodeLayout, format: PixelFormat, protocol: Protocol, ceiling: u32) -> Self {
        Self {
            timing,
            nodes,
            format,
            protocol,
            ceiling,
            rg_swap: false,
        }
    }

    /// Swap red and green on the wire (GRB strips)
    pub fn with_rg_swap(mut self, rg_swap: bool) -> Self {
        self.rg_swap = rg_swap;
        self
    }

    pub fn timing(&self) -> &BitTiming {
        &self.timing
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn rg_swap(&self) -> bool {
        self.rg_swap
    }

    pub fn new_frame(&self) -> EncodedFrame {
        EncodedFrame::new(self.timing.frame_layout())
    }

    /// Pivot cache matching this encoder's limiting and wiring
    pub fn new_pivot_cache(&self) -> PivotCache {
        PivotCache::new(self.nodes, self.ceiling, self.rg_swap)
    }

    fn blank_rows(&self, frame: &mut EncodedFrame) {
        let off = self.format.pack(ALL_LINES_OFF);
        for row in self.nodes.universe_len()..frame.layout.height() {
            frame.row_mut(row).fill(off);
        }
    }

    /// Reference path: gather each row straight from a universe-major snapshot
    pub fn encode_frame_direct(&self, snapshot: &[NodeColor], frame: &mut EncodedFrame) {
        let layout = frame.layout;
        let mut colors = vec![NodeColor::NONE; self.nodes.num_universes()];
        for row in 0..self.nodes.universe_len().min(layout.height()) {
            for (universe, slot) in colors.iter_mut().enumerate() {
                *slot = snapshot[self.nodes.offset(universe, row)];
            }
            let out = frame.row_mut(row);
            match self.protocol {
                Protocol::None => write_preview_row(&colors, self.ceiling, &layout, self.format, out),
                Protocol::Ws281x => {
                    let masks = line_masks(&colors, self.ceiling, self.rg_swap);
                    write_row(&masks, &layout, self.format, out);
                }
            }
        }
        self.blank_rows(frame);
    }

    /// Fast path: rows come pre-transposed from the pivot cache
    pub fn encode_frame_pivot(&self, cache: &PivotCache, frame: &mut EncodedFrame) {
        let layout = frame.layout;
        for row in 0..self.nodes.universe_len().min(layout.height()) {
            write_row(cache.row_masks(row), &layout, self.format, frame.row_mut(row));
        }
        self.blank_rows(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DEFAULT_BRIGHTNESS_CEILING;

    #[test]
    fn test_line_masks_single_universe() {
        let masks = line_masks(&[NodeColor::from_rgb(0x80, 0x00, 0x01)], FULL, false);
        assert_eq!(masks[0], 1);
        assert!(masks[1..23].iter().all(|&m| m == 0));
        assert_eq!(masks[23], 1);
    }

    const FULL: u32 = crate::color::FULL_BRIGHTNESS;

    #[test]
    fn test_line_masks_universe_bits() {
        let colors = [NodeColor::RED, NodeColor::GREEN, NodeColor::BLUE];
        let masks = line_masks(&colors, FULL, false);
        assert!(masks[0..8].iter().all(|&m| m == 0b001));
        assert!(masks[8..16].iter().all(|&m| m == 0b010));
        assert!(masks[16..24].iter().all(|&m| m == 0b100));

        let swapped = line_masks(&colors, FULL, true);
        assert!(swapped[0..8].iter().all(|&m| m == 0b010));
        assert!(swapped[8..16].iter().all(|&m| m == 0b001));
    }

    #[test]
    fn test_line_masks_apply_ceiling() {
        let masks = line_masks(&[NodeColor::WHITE], DEFAULT_BRIGHTNESS_CEILING, false);
        // 212 = 0b1101_0100 on every channel
        let expected = [1, 1, 0, 1, 0, 1, 0, 0];
        for channel in 0..3 {
            for (i, &bit) in expected.iter().enumerate() {
                assert_eq!(masks[channel * 8 + i], bit);
            }
        }
    }

    #[test]
    fn test_write_row_trailing_columns_off() {
        let layout = FrameLayout::new(75, 1, 1);
        let format = PixelFormat::default();
        let mut out = vec![0u32; 75];
        write_row(&[0; NODE_BITS], &layout, format, &mut out);
        assert_eq!(out[0], ALL_LINES_ON);
        assert_eq!(out[1], ALL_LINES_OFF);
        assert_eq!(out[2], ALL_LINES_OFF);
        assert_eq!(out[69], ALL_LINES_ON);
        assert!(out[71..].iter().all(|&p| p == ALL_LINES_OFF));
    }

    #[test]
    fn test_preview_bands() {
        let layout = FrameLayout::new(8, 1, 1);
        let mut out = vec![0u32; 8];
        let colors = [NodeColor::RED, NodeColor::from_argb(0x10, 0, 0, 9)];
        write_preview_row(&colors, FULL, &layout, PixelFormat::default(), &mut out);
        assert_eq!(&out[..4], &[NodeColor::RED.0; 4]);
        assert_eq!(&out[4..], &[0xFF00_0009; 4]);
    }
}
