//! Aborts the process if the master loop stalls.
//!
//! Heartbeats and the watchdog's own clock both ride
//! [`Timekeep::spawn_cache_updater`]'s background-refreshed tick cache
//! rather than a private `Instant`, so the watchdog shares the exact
//! clock the control pipeline reasons about (tick wraparound included).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rwchcd_core::timekeep::{tk_to_sec, Tick};

use crate::master::ShutdownSignal;

/// A heartbeat the master loop stores into each iteration and the
/// watchdog thread reads back.
pub type Heartbeat = Arc<AtomicU32>;

/// Spawns the watchdog thread. `now_cache` is the shared tick reader
/// (from `Timekeep::spawn_cache_updater`); `beat` is updated by the
/// master loop on every iteration. Aborts the process if `beat` goes
/// stale for longer than `timeout_s`.
pub fn spawn(now_cache: Arc<AtomicU32>, beat: Heartbeat, timeout_s: u64, signal: Arc<ShutdownSignal>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(1));
        if !signal.running.load(Ordering::SeqCst) {
            return;
        }
        let now: Tick = now_cache.load(Ordering::Acquire);
        let last: Tick = beat.load(Ordering::Acquire);
        let age_s = tk_to_sec(now.wrapping_sub(last));
        if age_s > timeout_s {
            tracing::error!(age_s, "watchdog timeout: master loop stalled, aborting");
            std::process::abort();
        }
    })
}

/// A fresh, unset heartbeat; the master loop stamps it with the clock's
/// current tick on every iteration once the loop starts.
pub fn new_heartbeat(now: Tick) -> Heartbeat {
    Arc::new(AtomicU32::new(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_starts_at_given_tick() {
        let beat = new_heartbeat(42);
        assert_eq!(beat.load(Ordering::Acquire), 42);
    }
}
