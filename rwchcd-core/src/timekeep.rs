//! Monotonic tick source at 0.1 s resolution.
//!
//! `Tick` wraps at 32 bits by design; comparisons must go through
//! [`a_ge_b`], which orders ticks under wraparound using half-range
//! arithmetic rather than plain `>=`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::TK_PER_SEC;

/// A wrap-aware monotonic tick count, 0.1 s resolution.
pub type Tick = u32;

/// `sec_to_tk(s) := s * 10`.
pub fn sec_to_tk(s: u64) -> Tick {
    (s.wrapping_mul(TK_PER_SEC as u64)) as Tick
}

/// `tk_to_sec(t) := t / 10`.
pub fn tk_to_sec(t: Tick) -> u64 {
    (t as u64) / TK_PER_SEC as u64
}

/// Wrap-aware "is `a` at least as recent as `b`".
pub fn a_ge_b(a: Tick, b: Tick) -> bool {
    a.wrapping_sub(b) < (1u32 << 31)
}

/// A monotonic clock anchored at construction time.
///
/// `now()` is lock-free: it derives the current tick directly from
/// [`Instant::now`], so it never needs a background thread to stay
/// live. [`Timekeep::spawn_cache_updater`] is provided for callers (the
/// watchdog) that want a cheaply-readable cached value updated on its
/// own thread instead of recomputing on every read.
#[derive(Debug, Clone)]
pub struct Timekeep {
    start: Instant,
}

impl Default for Timekeep {
    fn default() -> Self {
        Self::new()
    }
}

impl Timekeep {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Current tick, lock-free and monotonic.
    pub fn now(&self) -> Tick {
        let elapsed = self.start.elapsed();
        let ticks = elapsed.as_secs().wrapping_mul(TK_PER_SEC as u64)
            + (elapsed.subsec_millis() as u64) / 100;
        ticks as Tick
    }

    /// Sleeps at least `seconds`; no background thread required.
    pub fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
    }

    /// Sleeps at least one tick (0.1 s).
    pub fn sleep_ticks(&self, ticks: u32) {
        self.sleep(ticks as f64 / TK_PER_SEC as f64);
    }

    /// Spawns a thread that refreshes a shared cached tick value every
    /// 100 ms. Returns the cache handle; the thread runs until the
    /// process exits (there is no per-thread cancellation need: it owns
    /// no resources besides the clock).
    pub fn spawn_cache_updater(&self) -> Arc<AtomicU32> {
        let cache = Arc::new(AtomicU32::new(self.now()));
        let tk = self.clone();
        let cache_handle = Arc::clone(&cache);
        thread::spawn(move || loop {
            cache_handle.store(tk.now(), Ordering::Release);
            thread::sleep(Duration::from_millis(100));
        });
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sec_tk_round_trip() {
        for s in [0u64, 1, 60, 3600, 86400] {
            assert_eq!(tk_to_sec(sec_to_tk(s)), s);
        }
    }

    #[test]
    fn wraparound_ordering() {
        let b: Tick = u32::MAX - 2;
        let a: Tick = 5; // wrapped past u32::MAX
        assert!(a_ge_b(a, b));
        assert!(!a_ge_b(b, a));
    }

    #[test]
    fn now_is_monotonic() {
        let tk = Timekeep::new();
        let a = tk.now();
        tk.sleep(0.05);
        let b = tk.now();
        assert!(a_ge_b(b, a));
    }
}
