//! Cross-process wait/wake on a shared `AtomicU32` word. Linux provides this
//! natively via the `futex` syscall; everywhere else falls back to a bounded
//! spin-and-sleep loop since the words live in a file-backed mapping that
//! condvars can't reach across processes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[cfg(target_os = "linux")]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as i64,
    };
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected as i32,
            &ts as *const libc::timespec,
        );
    }
}

#[cfg(target_os = "linux")]
pub fn wake(word: &AtomicU32, n: i32) {
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, n);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let step = Duration::from_micros(200);
    let mut waited = Duration::ZERO;
    while word.load(Ordering::Acquire) == expected && waited < timeout {
        std::thread::sleep(step);
        waited += step;
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wake(_word: &AtomicU32, _n: i32) {}

/// Bumps the word so waiters reobserve a change, then wakes them.
pub fn signal(word: &AtomicU32) {
    word.fetch_add(1, Ordering::AcqRel);
    wake(word, i32::MAX);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_returns_once_timeout_elapses_with_no_wake() {
        let word = AtomicU32::new(0);
        let started = std::time::Instant::now();
        wait(&word, 0, Duration::from_millis(20));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn signal_bumps_the_word() {
        let word = AtomicU32::new(5);
        signal(&word);
        assert_eq!(word.load(Ordering::Acquire), 6);
    }
}
