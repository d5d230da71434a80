//! Pure index math for the node arena and the encoded frame
//!
//! Storage never computes its own offsets. Both the shared node cells and the
//! encoded pixel buffer are flat arrays addressed through these layouts.

use std::ops::Range;

use super::constants::*;

/// Universe-major layout of the node cells.
///
/// Each universe occupies `stride` cells, padded up to a whole cache line so
/// that producers working on different universes never share a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    num_universes: usize,
    universe_len: usize,
    stride: usize,
}

impl NodeLayout {
    pub fn new(num_universes: usize, universe_len: usize) -> Self {
        Self {
            num_universes,
            universe_len,
            stride: round_up(universe_len.max(1), CELLS_PER_LINE),
        }
    }

    pub fn num_universes(&self) -> usize {
        self.num_universes
    }

    pub fn universe_len(&self) -> usize {
        self.universe_len
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total cells including padding
    pub fn total_cells(&self) -> usize {
        self.num_universes * self.stride
    }

    pub fn byte_len(&self) -> usize {
        self.total_cells() * std::mem::size_of::<u32>()
    }

    /// Cell offset of `(universe, position)`; caller guarantees both are in range
    #[inline]
    pub fn offset(&self, universe: usize, position: usize) -> usize {
        debug_assert!(universe < self.num_universes && position < self.universe_len);
        universe * self.stride + position
    }

    pub fn checked_offset(&self, universe: usize, position: usize) -> Option<usize> {
        if universe < self.num_universes && position < self.universe_len {
            Some(self.offset(universe, position))
        } else {
            None
        }
    }

    /// Cells of one universe, padding excluded
    pub fn universe_span(&self, universe: usize) -> Range<usize> {
        let start = universe * self.stride;
        start..start + self.universe_len
    }

    /// Mask with one bit per universe
    pub fn all_universes_mask(&self) -> u32 {
        if self.num_universes >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_universes) - 1
        }
    }
}

/// Layout of one encoded frame: rows are node positions, columns are bit slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    width: usize,
    height: usize,
    slice_px: usize,
}

impl FrameLayout {
    pub fn new(width: usize, height: usize, slice_px: usize) -> Self {
        Self {
            width,
            height,
            slice_px,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn slice_px(&self) -> usize {
        self.slice_px
    }

    pub fn total_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Pixels of one scan row
    pub fn row_span(&self, row: usize) -> Range<usize> {
        let start = row * self.width;
        start..start + self.width
    }

    /// Index of the slice carrying `subwindow` of `bit` (bit 0 is the MSB, sent first)
    #[inline]
    pub fn slice_index(bit: usize, subwindow: usize) -> usize {
        bit * SUBWINDOWS_PER_BIT + subwindow
    }

    /// Columns of one slice within a row
    pub fn slice_columns(&self, slice: usize) -> Range<usize> {
        let start = slice * self.slice_px;
        start..start + self.slice_px
    }

    /// First column past the visible slices; everything from here is held off
    pub fn visible_end(&self) -> usize {
        (VISIBLE_SLICES * self.slice_px).min(self.width)
    }

    /// Pixel span for `(row, bit, subwindow)`, or `None` for the hidden final trail
    pub fn slice_span(&self, row: usize, bit: usize, subwindow: usize) -> Option<Range<usize>> {
        let slice = Self::slice_index(bit, subwindow);
        if slice >= VISIBLE_SLICES {
            return None;
        }
        let cols = self.slice_columns(slice);
        let base = row * self.width;
        Some(base + cols.start..base + cols.end)
    }
}
