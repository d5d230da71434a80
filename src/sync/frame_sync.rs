//! Ready-mask / frame-counter protocol between producers and the owner
//!
//! Producers OR their universe bits into `ready_mask`. The owner waits for
//! every bit, produces the frame, clears the mask with one swap and bumps
//! `frame_counter`. Producers detect completion only through the counter: by
//! the time a waiter wakes, the mask may already hold bits for the next frame.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::layout::SyncWords;

use super::futex;

/// What a `submit` observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Frame counter read before the bits were set
    pub seen_frame: u32,
    /// This submission set the last missing bit
    pub completed: bool,
}

/// Protocol operations over the shared sync words of one session
#[derive(Debug, Clone, Copy)]
pub struct FrameSync<'a> {
    words: &'a SyncWords,
    all_mask: u32,
}

impl<'a> FrameSync<'a> {
    pub fn new(words: &'a SyncWords, all_mask: u32) -> Self {
        Self { words, all_mask }
    }

    pub fn all_mask(&self) -> u32 {
        self.all_mask
    }

    pub fn ready_mask(&self) -> u32 {
        self.words.ready_mask.load(Ordering::Acquire)
    }

    pub fn frame_counter(&self) -> u32 {
        self.words.frame_counter.load(Ordering::Acquire)
    }

    pub fn is_all_ready(&self) -> bool {
        self.ready_mask() & self.all_mask == self.all_mask
    }

    /// Mark `mask` ready. Wakes the owner if this completed the frame.
    pub fn submit(&self, mask: u32) -> Submission {
        let seen_frame = self.words.frame_counter.load(Ordering::Acquire);
        let prev = self.words.ready_mask.fetch_or(mask, Ordering::AcqRel);
        let completed =
            prev & self.all_mask != self.all_mask && (prev | mask) & self.all_mask == self.all_mask;
        if completed {
            futex::wake_all(&self.words.ready_mask);
        }
        Submission {
            seen_frame,
            completed,
        }
    }

    /// Owner side: block until every universe is ready
    pub fn wait_all_ready(&self, deadline: Option<Instant>) -> bool {
        let all = self.all_mask;
        futex::wait_for(&self.words.ready_mask, deadline, |mask| mask & all == all)
    }

    /// Producer side: block until the frame counter moves past `seen`
    pub fn wait_frame_advance(&self, seen: u32, deadline: Option<Instant>) -> bool {
        futex::wait_for(&self.words.frame_counter, deadline, |frame| frame != seen)
    }

    /// Owner side: reset the mask, publish the new frame number and wake waiters.
    ///
    /// The mask is cleared before the counter moves, so no producer can set
    /// next-frame bits that this clear would lose.
    pub fn complete_frame(&self) -> u32 {
        let consumed = self.words.ready_mask.swap(0, Ordering::AcqRel);
        debug_assert_eq!(consumed & self.all_mask, self.all_mask);
        let frame = self
            .words
            .frame_counter
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        futex::wake_all(&self.words.frame_counter);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_submit_completion() {
        let words = SyncWords::default();
        let sync = FrameSync::new(&words, 0b1111);

        let s = sync.submit(0b0001);
        assert_eq!(s, Submission { seen_frame: 0, completed: false });
        let s = sync.submit(0b0110);
        assert!(!s.completed);
        assert!(!sync.is_all_ready());

        let s = sync.submit(0b1000);
        assert!(s.completed);
        assert!(sync.is_all_ready());

        // A duplicate submission does not complete the frame a second time
        assert!(!sync.submit(0b1000).completed);
    }

    #[test]
    fn test_complete_frame_resets_mask() {
        let words = SyncWords::default();
        let sync = FrameSync::new(&words, 0b11);
        sync.submit(0b11);
        assert!(sync.wait_all_ready(None));

        assert_eq!(sync.complete_frame(), 1);
        assert_eq!(sync.ready_mask(), 0);
        assert_eq!(sync.frame_counter(), 1);
        assert!(sync.wait_frame_advance(0, None));
    }

    #[test]
    fn test_partial_mask_times_out() {
        let words = SyncWords::default();
        let sync = FrameSync::new(&words, 0b11);
        sync.submit(0b01);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!sync.wait_all_ready(Some(deadline)));
        assert_eq!(sync.frame_counter(), 0);
    }
}
