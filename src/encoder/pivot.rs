//! Row-major cache of line masks
//!
//! The node buffer is universe-major, the encoder wants one row across all
//! universes at a time. The cache keeps every row already transposed into
//! [`LineMasks`] and only recomputes rows that producers flagged dirty.

use crate::color::NodeColor;
use crate::layout::{NodeLayout, NODE_BITS};
use crate::node_buffer::NodeBuffer;

use super::encode::{line_masks, LineMasks};

#[derive(Debug, Clone)]
pub struct PivotCache {
    masks: Vec<LineMasks>,
    scratch: Vec<NodeColor>,
    layout: NodeLayout,
    ceiling: u32,
    rg_swap: bool,
    primed: bool,
}

impl PivotCache {
    pub fn new(layout: NodeLayout, ceiling: u32, rg_swap: bool) -> Self {
        Self {
            masks: vec![[0; NODE_BITS]; layout.universe_len()],
            scratch: vec![NodeColor::NONE; layout.num_universes()],
            layout,
            ceiling,
            rg_swap,
            primed: false,
        }
    }

    /// Bring the cache up to date with `buffer` and return the rows recomputed.
    ///
    /// Dirty flags are cleared before their rows are read, so a write racing
    /// with the refresh is picked up again next time.
    pub fn refresh(&mut self, buffer: &NodeBuffer<'_>) -> usize {
        let rows = self.layout.universe_len();
        let words = (rows + 63) / 64;
        let dirty = buffer.dirty();

        if !self.primed {
            for word in 0..words {
                dirty.take_word(word);
            }
            for row in 0..rows {
                self.recompute(buffer, row);
            }
            self.primed = true;
            return rows;
        }

        let mut recomputed = 0;
        for word in 0..words {
            let mut bits = dirty.take_word(word);
            while bits != 0 {
                let row = word * 64 + bits.trailing_zeros() as usize;
                bits &= bits - 1;
                if row < rows {
                    self.recompute(buffer, row);
                    recomputed += 1;
                }
            }
        }
        recomputed
    }

    fn recompute(&mut self, buffer: &NodeBuffer<'_>, row: usize) {
        buffer.gather_row(row, &mut self.scratch);
        self.masks[row] = line_masks(&self.scratch, self.ceiling, self.rg_swap);
    }

    pub fn row_masks(&self, row: usize) -> &LineMasks {
        &self.masks[row]
    }

    /// Force a full recompute on the next refresh
    pub fn invalidate(&mut self) {
        self.primed = false;
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::FULL_BRIGHTNESS;
    use crate::node_buffer::LocalCells;

    #[test]
    fn test_first_refresh_recomputes_everything() {
        let local = LocalCells::new(3, 70);
        let buffer = local.buffer();
        buffer.fill_rect(0..3, 0..70, NodeColor::RED);

        let mut cache = PivotCache::new(local.layout, FULL_BRIGHTNESS, false);
        assert_eq!(cache.refresh(&buffer), 70);
        assert_eq!(cache.row_masks(69)[0], 0b111);
        assert_eq!(local.dirty.count(), 0);
        assert_eq!(cache.refresh(&buffer), 0);
    }

    #[test]
    fn test_only_dirty_rows_recomputed() {
        let local = LocalCells::new(2, 100);
        let buffer = local.buffer();
        let mut cache = PivotCache::new(local.layout, FULL_BRIGHTNESS, false);
        cache.refresh(&buffer);

        buffer.blend(1, 5, NodeColor::BLUE);
        buffer.blend(0, 99, NodeColor::GREEN);
        assert_eq!(cache.refresh(&buffer), 2);
        assert_eq!(cache.row_masks(5)[23], 0b10);
        assert_eq!(cache.row_masks(99)[15], 0b01);
        assert_eq!(cache.row_masks(6)[23], 0);
    }

    #[test]
    fn test_invalidate() {
        let local = LocalCells::new(1, 4);
        let buffer = local.buffer();
        let mut cache = PivotCache::new(local.layout, FULL_BRIGHTNESS, false);
        cache.refresh(&buffer);
        cache.invalidate();
        assert!(!cache.is_primed());
        assert_eq!(cache.refresh(&buffer), 4);
    }
}
