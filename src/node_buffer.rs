//! Universe x position array of node colors
//!
//! A `NodeBuffer` is a borrowed view over cells that normally live in the
//! shared session region. Cells are atomics so that producers may write while
//! the owner reads without data races; partitioning universes among producers
//! remains a caller convention. Any write that changes a cell flags its row in
//! the dirty bitmap for the pivot cache.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::color::{BlendMode, NodeColor};
use crate::layout::{DirtyRows, NodeLayout};

#[derive(Debug, Clone, Copy)]
pub struct NodeBuffer<'a> {
    cells: &'a [AtomicU32],
    dirty: &'a DirtyRows,
    layout: NodeLayout,
}

impl<'a> NodeBuffer<'a> {
    pub fn new(cells: &'a [AtomicU32], dirty: &'a DirtyRows, layout: NodeLayout) -> Self {
        assert!(
            cells.len() >= layout.total_cells(),
            "node cells shorter than layout"
        );
        Self {
            cells,
            dirty,
            layout,
        }
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn dirty(&self) -> &'a DirtyRows {
        self.dirty
    }

    pub fn num_universes(&self) -> usize {
        self.layout.num_universes()
    }

    pub fn universe_len(&self) -> usize {
        self.layout.universe_len()
    }

    pub fn get(&self, universe: usize, position: usize) -> Option<NodeColor> {
        self.layout
            .checked_offset(universe, position)
            .map(|offset| NodeColor(self.cells[offset].load(Ordering::Relaxed)))
    }

    /// Blend `color` over one cell and return the previous value
    pub fn blend(&self, universe: usize, position: usize, color: NodeColor) -> Option<NodeColor> {
        self.write(universe, position, color, BlendMode::AlphaBlend)
    }

    /// Write one cell under `mode` and return the previous value
    pub fn write(
        &self,
        universe: usize,
        position: usize,
        color: NodeColor,
        mode: BlendMode,
    ) -> Option<NodeColor> {
        let offset = self.layout.checked_offset(universe, position)?;
        let prev = self.write_cell(offset, color, mode);
        if prev != mode.apply(color, prev) {
            self.dirty.mark(position);
        }
        Some(prev)
    }

    fn write_cell(&self, offset: usize, color: NodeColor, mode: BlendMode) -> NodeColor {
        let cell = &self.cells[offset];
        if mode == BlendMode::Replace || color.is_opaque() {
            return NodeColor(cell.swap(color.0, Ordering::Relaxed));
        }
        match cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |old| {
            Some(color.blend_over(NodeColor(old)).0)
        }) {
            Ok(old) | Err(old) => NodeColor(old),
        }
    }

    /// Blend `color` over a rectangle that the caller has already clipped.
    ///
    /// Returns the number of cells written.
    pub fn fill_rect(&self, universes: Range<usize>, nodes: Range<usize>, color: NodeColor) -> usize {
        self.write_rect(universes, nodes, color, BlendMode::AlphaBlend)
    }

    /// Write `color` under `mode` to a rectangle that the caller has already clipped
    pub fn write_rect(
        &self,
        universes: Range<usize>,
        nodes: Range<usize>,
        color: NodeColor,
        mode: BlendMode,
    ) -> usize {
        let mut changed = false;
        let mut written = 0;
        for universe in universes {
            for position in nodes.clone() {
                let offset = self.layout.offset(universe, position);
                let prev = self.write_cell(offset, color, mode);
                changed |= prev != mode.apply(color, prev);
                written += 1;
            }
        }
        if changed {
            self.dirty.mark_range(nodes);
        }
        written
    }

    /// Overwrite every cell without blending; used to initialize a new session
    pub fn reset(&self, color: NodeColor) {
        for universe in 0..self.num_universes() {
            for cell in &self.cells[self.layout.universe_span(universe)] {
                cell.store(color.0, Ordering::Relaxed);
            }
        }
        self.dirty.mark_all();
    }

    /// Colors of one row (node position) across all universes, in universe order
    pub fn gather_row(&self, row: usize, out: &mut [NodeColor]) {
        for (universe, slot) in out.iter_mut().enumerate().take(self.num_universes()) {
            let offset = self.layout.offset(universe, row);
            *slot = NodeColor(self.cells[offset].load(Ordering::Relaxed));
        }
    }

    /// Copy every cell (padding included) into `out`, universe-major
    pub fn snapshot_into(&self, out: &mut Vec<NodeColor>) {
        out.clear();
        out.extend(
            self.cells[..self.layout.total_cells()]
                .iter()
                .map(|c| NodeColor(c.load(Ordering::Relaxed))),
        );
    }
}

/// Heap-backed cells for a buffer that is not shared, as used by tests and benches
#[derive(Debug)]
pub struct LocalCells {
    pub cells: Vec<AtomicU32>,
    pub dirty: DirtyRows,
    pub layout: NodeLayout,
}

impl LocalCells {
    pub fn new(num_universes: usize, universe_len: usize) -> Self {
        let layout = NodeLayout::new(num_universes, universe_len);
        Self {
            cells: (0..layout.total_cells()).map(|_| AtomicU32::new(0)).collect(),
            dirty: DirtyRows::default(),
            layout,
        }
    }

    pub fn buffer(&self) -> NodeBuffer<'_> {
        NodeBuffer::new(&self.cells, &self.dirty, self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DIRTY_WORDS;

    fn clear_dirty(local: &LocalCells) {
        for word in 0..DIRTY_WORDS {
            local.dirty.take_word(word);
        }
    }

    #[test]
    fn test_blend_returns_previous() {
        let local = LocalCells::new(4, 5);
        let buf = local.buffer();
        buf.reset(NodeColor::BLACK);
        clear_dirty(&local);

        assert_eq!(buf.blend(2, 3, NodeColor::BLUE), Some(NodeColor::BLACK));
        assert_eq!(local.dirty.count(), 1);
        assert_eq!(buf.blend(2, 3, NodeColor::BLUE), Some(NodeColor::BLUE));
        assert_eq!(buf.get(2, 3), Some(NodeColor::BLUE));
        assert_eq!(buf.blend(4, 0, NodeColor::BLUE), None);
    }

    #[test]
    fn test_unchanged_write_is_not_dirty() {
        let local = LocalCells::new(2, 8);
        let buf = local.buffer();
        buf.reset(NodeColor::RED);
        clear_dirty(&local);

        buf.blend(1, 7, NodeColor::RED);
        buf.fill_rect(0..2, 0..8, NodeColor::NONE);
        assert_eq!(local.dirty.count(), 0);
    }

    #[test]
    fn test_fill_rect_and_gather() {
        let local = LocalCells::new(3, 4);
        let buf = local.buffer();
        assert_eq!(buf.fill_rect(1..3, 1..3, NodeColor::GREEN), 4);

        let mut row = [NodeColor::NONE; 3];
        buf.gather_row(1, &mut row);
        assert_eq!(row, [NodeColor::NONE, NodeColor::GREEN, NodeColor::GREEN]);
        buf.gather_row(0, &mut row);
        assert_eq!(row, [NodeColor::NONE; 3]);
        assert_eq!(local.dirty.take_word(0), 0b0110);
    }

    #[test]
    fn test_replace_is_idempotent() {
        let local = LocalCells::new(2, 4);
        let buf = local.buffer();
        buf.reset(NodeColor::BLACK);
        let half_red = NodeColor::from_argb(0x80, 200, 0, 0);

        assert_eq!(buf.write_rect(0..2, 0..4, half_red, BlendMode::Replace), 8);
        clear_dirty(&local);
        buf.write_rect(0..2, 0..4, half_red, BlendMode::Replace);
        assert_eq!(buf.get(1, 3), Some(half_red));
        assert_eq!(local.dirty.count(), 0);

        assert_eq!(buf.write(0, 0, NodeColor::BLUE, BlendMode::Replace), Some(half_red));
        assert_eq!(buf.write(0, 0, NodeColor::NONE, BlendMode::Replace), Some(NodeColor::BLUE));
        assert_eq!(buf.get(0, 0), Some(NodeColor::NONE));
    }

    #[test]
    fn test_snapshot_includes_padding() {
        let local = LocalCells::new(2, 3);
        let buf = local.buffer();
        buf.reset(NodeColor::WHITE);
        let mut snap = Vec::new();
        buf.snapshot_into(&mut snap);
        assert_eq!(snap.len(), 32);
        assert_eq!(snap[0], NodeColor::WHITE);
        assert_eq!(snap[3], NodeColor::NONE);
        assert_eq!(snap[16], NodeColor::WHITE);
    }
}
