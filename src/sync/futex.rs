//! Cross-process wait/wake on 32-bit words in shared memory
//!
//! On Linux this is a non-private futex, keyed by the physical page, so it
//! works between processes mapping the same file. Elsewhere waiting falls back
//! to bounded polling and waking is a no-op.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[cfg(not(target_os = "linux"))]
const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Why a single wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken, interrupted, or the word no longer held the expected value
    Woken,
    /// The timeout expired
    TimedOut,
}

/// Block while `word == expected`, for at most `timeout`.
///
/// Spurious returns are possible; callers re-check their condition.
#[cfg(target_os = "linux")]
pub fn wait_while_equal(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    use nix::errno::Errno;

    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
        )
    };
    if rc == -1 && Errno::last() == Errno::ETIMEDOUT {
        return WaitOutcome::TimedOut;
    }
    WaitOutcome::Woken
}

#[cfg(not(target_os = "linux"))]
pub fn wait_while_equal(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if word.load(Ordering::Acquire) != expected {
            return WaitOutcome::Woken;
        }
        let mut nap = POLL_INTERVAL;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            nap = nap.min(deadline - now);
        }
        std::thread::sleep(nap);
    }
}

/// Wake up to `count` waiters blocked on `word`
#[cfg(target_os = "linux")]
pub fn wake(word: &AtomicU32, count: u32) -> usize {
    let count = count.min(i32::MAX as u32) as libc::c_int;
    let rc = unsafe { libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count) };
    if rc < 0 {
        0
    } else {
        rc as usize
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wake(_word: &AtomicU32, _count: u32) -> usize {
    0
}

/// Wake every waiter on `word`
pub fn wake_all(word: &AtomicU32) -> usize {
    wake(word, u32::MAX)
}

/// Block until `condition(word)` holds or `deadline` passes.
///
/// Returns whether the condition was met.
pub fn wait_for(
    word: &AtomicU32,
    deadline: Option<Instant>,
    condition: impl Fn(u32) -> bool,
) -> bool {
    loop {
        let value = word.load(Ordering::Acquire);
        if condition(value) {
            return true;
        }
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                Some(deadline - now)
            }
            None => None,
        };
        wait_while_equal(word, value, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_returns_when_value_differs() {
        let word = AtomicU32::new(5);
        let outcome = wait_while_equal(&word, 4, Some(Duration::from_secs(1)));
        assert_eq!(outcome, WaitOutcome::Woken);
    }

    #[test]
    fn test_wait_times_out() {
        let word = AtomicU32::new(0);
        let start = Instant::now();
        let met = wait_for(&word, Some(start + Duration::from_millis(30)), |v| v != 0);
        assert!(!met);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wake_across_threads() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter = {
            let word = word.clone();
            thread::spawn(move || {
                wait_for(&word, Some(Instant::now() + Duration::from_secs(5)), |v| v == 1)
            })
        };

        thread::sleep(Duration::from_millis(20));
        word.store(1, Ordering::Release);
        wake_all(&word);
        assert!(waiter.join().unwrap());
    }
}
