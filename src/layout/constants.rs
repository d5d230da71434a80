//! Constants for the shared session layout and the WS281X bit framing

/// Cache line size for alignment (64 bytes covers both ARM and x86_64)
pub const CACHE_LINE_SIZE: usize = 64;

/// Magic number identifying an initialized session header
pub const SESSION_MAGIC: u64 = 0x4750_5550_4F52_5431; // "GPUPORT1"

/// Current session layout version
pub const SCHEMA_VERSION: u32 = 1;

/// Output lines available on a 24-bit parallel display interface
pub const MAX_UNIVERSES: usize = 24;

/// Largest universe length a session can be built with
pub const MAX_UNIVERSE_LEN: usize = 2048;

/// Bits shifted out per WS281X node
pub const NODE_BITS: usize = 24;

/// Lead, data and trail sub-windows per bit
pub const SUBWINDOWS_PER_BIT: usize = 3;

/// Horizontal slices per scan line (one per sub-window)
pub const BIT_SLICES: usize = NODE_BITS * SUBWINDOWS_PER_BIT;

/// The last trail slice falls into horizontal blanking
pub const VISIBLE_SLICES: usize = BIT_SLICES - 1;

/// Node colors per cache line
pub const CELLS_PER_LINE: usize = CACHE_LINE_SIZE / std::mem::size_of::<u32>();

/// Words in the dirty-row bitmap
pub const DIRTY_WORDS: usize = MAX_UNIVERSE_LEN / 64;

/// Round `value` up to a multiple of `align`
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_counts() {
        assert_eq!(BIT_SLICES, 72);
        assert_eq!(VISIBLE_SLICES, 71);
        assert_eq!(CELLS_PER_LINE, 16);
        assert_eq!(DIRTY_WORDS * 64, MAX_UNIVERSE_LEN);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(1111, 16), 1120);
        assert_eq!(round_up(64, 64), 64);
    }
}
