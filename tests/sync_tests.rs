//! Tests for cross-attach frame synchronization

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use gpuport::layout::SyncWords;
use gpuport::memory::{FileBackedProvider, SharedMemoryProvider};
use gpuport::sync::{futex, FrameSync};
use proptest::prelude::*;
use tempfile::TempDir;

fn deadline() -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(10))
}

#[cfg(test)]
mod sync_tests {
    use super::*;

    /// Test: concurrent submits leave exactly the OR of all masks
    #[test]
    fn test_concurrent_submit_is_or() {
        let words = Arc::new(SyncWords::default());
        let masks: Vec<u32> = (0..8).map(|i| 1 << (i * 2)).collect();
        let expected = masks.iter().fold(0, |acc, m| acc | m);
        let barrier = Arc::new(Barrier::new(masks.len()));

        let handles: Vec<_> = masks
            .iter()
            .map(|&mask| {
                let words = words.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    // all_mask is wider than the union so nobody completes
                    FrameSync::new(&words, u32::MAX).submit(mask)
                })
            })
            .collect();

        for handle in handles {
            assert!(!handle.join().unwrap().completed);
        }
        assert_eq!(words.ready_mask.load(Ordering::SeqCst), expected);
        assert_eq!(words.frame_counter.load(Ordering::SeqCst), 0);
    }

    /// Test: exactly one submitter observes completion of the mask
    #[test]
    fn test_single_completer() {
        for _ in 0..50 {
            let words = Arc::new(SyncWords::default());
            let barrier = Arc::new(Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let words = words.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        FrameSync::new(&words, 0b1111).submit(1 << i).completed
                    })
                })
                .collect();
            let completers = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&c| c)
                .count();
            assert_eq!(completers, 1);
        }
    }

    /// Test: lockstep frames advance the counter by exactly one each
    #[test]
    fn test_lockstep_frames() {
        const FRAMES: u32 = 50;
        let words = Arc::new(SyncWords::default());
        let all_mask = 0b111;

        let producers: Vec<_> = [0b001u32, 0b010]
            .into_iter()
            .map(|mask| {
                let words = words.clone();
                thread::spawn(move || {
                    let sync = FrameSync::new(&words, all_mask);
                    let mut seen = Vec::new();
                    for _ in 0..FRAMES {
                        let submission = sync.submit(mask);
                        assert!(sync.wait_frame_advance(submission.seen_frame, deadline()));
                        seen.push(submission.seen_frame);
                    }
                    seen
                })
            })
            .collect();

        let sync = FrameSync::new(&words, all_mask);
        for frame in 0..FRAMES {
            sync.submit(0b100);
            assert!(sync.wait_all_ready(deadline()));
            assert_eq!(sync.frame_counter(), frame);
            assert_eq!(sync.complete_frame(), frame + 1);
        }

        for producer in producers {
            let seen = producer.join().unwrap();
            assert_eq!(seen, (0..FRAMES).collect::<Vec<_>>());
        }
        assert_eq!(sync.frame_counter(), FRAMES);
        assert_eq!(sync.ready_mask(), 0);
    }

    /// Test: a waiter blocked on one mapping is woken through another
    #[test]
    fn test_futex_across_mappings() {
        let dir = TempDir::new().unwrap();
        let provider = FileBackedProvider::new(dir.path());
        let a = provider.alloc("futex", 4096).unwrap().handle;
        let b = provider.alloc("futex", 4096).unwrap().handle;
        assert_ne!(a.as_ptr(), b.as_ptr());

        // SAFETY: both mappings are 64-byte aligned and at least 4 bytes long
        let word_a = unsafe { &*(a.as_ptr() as *const AtomicU32) };
        let word_b = unsafe { &*(b.as_ptr() as *const AtomicU32) };

        thread::scope(|s| {
            let waiter = s.spawn(|| futex::wait_for(word_b, deadline(), |v| v == 7));
            thread::sleep(Duration::from_millis(20));
            word_a.store(7, Ordering::Release);
            futex::wake_all(word_a);
            assert!(waiter.join().unwrap());
        });
    }

    /// Test: waiting past the deadline reports failure without side effects
    #[test]
    fn test_wait_deadline() {
        let words = SyncWords::default();
        let sync = FrameSync::new(&words, 0b11);
        sync.submit(0b01);

        let started = Instant::now();
        assert!(!sync.wait_all_ready(Some(Instant::now() + Duration::from_millis(30))));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(sync.ready_mask(), 0b01);
        assert_eq!(sync.frame_counter(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Test: random partitions of the universes always complete exactly once
        #[test]
        fn prop_partition_completes_once(assignment in prop::collection::vec(0usize..4, 1..=24)) {
            let all_mask = (1u32 << assignment.len()) - 1;
            let mut masks = [0u32; 4];
            for (universe, &producer) in assignment.iter().enumerate() {
                masks[producer] |= 1 << universe;
            }

            let words = Arc::new(SyncWords::default());
            let handles: Vec<_> = masks
                .into_iter()
                .filter(|&m| m != 0)
                .map(|mask| {
                    let words = words.clone();
                    thread::spawn(move || FrameSync::new(&words, all_mask).submit(mask).completed)
                })
                .collect();
            let completed = handles.into_iter().map(|h| h.join().unwrap()).filter(|&c| c).count();

            prop_assert_eq!(completed, 1);
            prop_assert_eq!(words.ready_mask.load(Ordering::SeqCst), all_mask);
        }
    }
}
