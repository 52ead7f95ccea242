//! Periodic background jobs unrelated to the master loop's own ~1 s
//! control tick: status logging today, calibration hooks later. Each
//! job is paced independently on its own thread so a slow job never
//! delays another's schedule.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rwchcd_core::runtime::{Runtime, Shared};

use crate::master::ShutdownSignal;

/// A periodic job run against a read-locked [`Runtime`].
pub struct TimerJob {
    pub name: &'static str,
    pub period_s: u64,
    pub callback: Box<dyn Fn(&Runtime) + Send>,
}

impl TimerJob {
    pub fn new(name: &'static str, period_s: u64, callback: impl Fn(&Runtime) + Send + 'static) -> Self {
        Self {
            name,
            period_s,
            callback: Box::new(callback),
        }
    }
}

/// Logs a snapshot of the plant's derived state, the same fields
/// `Plant::data()` exposes to the hardware-facing status file.
pub fn log_plant_status(rt: &Runtime) {
    let data = rt.plant.data();
    tracing::info!(
        could_sleep = data.could_sleep,
        consumer_shift = data.consumer_shift,
        consumer_stop_delay_s = data.consumer_stop_delay_s,
        summer = data.summer,
        summer_maintenance = data.summer_maintenance,
        "plant status"
    );
}

/// The built-in job set installed unconditionally: a status line once
/// a minute is cheap and gives an operator tailing the journal a pulse
/// even when nothing else is logging.
pub fn default_jobs() -> Vec<TimerJob> {
    vec![TimerJob::new("status", 60, log_plant_status)]
}

/// Spawns one thread per job. Each wakes in 1 s increments so it can
/// observe `signal` promptly, but only runs its callback once its own
/// `period_s` has elapsed.
pub fn spawn(jobs: Vec<TimerJob>, rt: Shared, signal: Arc<ShutdownSignal>) -> Vec<thread::JoinHandle<()>> {
    jobs.into_iter()
        .map(|job| {
            let rt = Arc::clone(&rt);
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let mut elapsed_s = 0u64;
                loop {
                    thread::sleep(Duration::from_secs(1));
                    if !signal.running.load(Ordering::SeqCst) {
                        return;
                    }
                    elapsed_s += 1;
                    if elapsed_s < job.period_s {
                        continue;
                    }
                    elapsed_s = 0;
                    let guard = rt.read();
                    (job.callback)(&guard);
                }
            })
        })
        .collect()
}
