//! The master loop: one thread, driving the control pipeline at ~1 s
//! resolution, plus a watchdog thread that aborts the process if the
//! master stalls.
//!
//! Mirrors the teacher's `run_control_loop` shape (load config if
//! signalled, do the work, sleep-or-wake-on-notify) with
//! `std::sync::{Condvar, Mutex}` standing in for `tokio::sync::Notify`,
//! since this loop runs on a plain OS thread rather than an async
//! runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rwchcd_core::actuator::Relay;
use rwchcd_core::alarms::Notifier;
use rwchcd_core::runtime::{Runtime, Shared};
use rwchcd_error::Result;

use crate::backend_ref::ReferenceBackend;
use crate::scheduler::Schedule;
use crate::setup::{relay_store_key, RELAY_SCHEMA_VERSION};
use crate::timer::TimerJob;
use crate::watchdog;

const MASTER_TICK: Duration = Duration::from_millis(100);

/// Shared shutdown flag; SIGINT/SIGTERM set it and notify the condvar
/// so the master thread wakes immediately instead of waiting out its
/// tick.
#[derive(Default)]
pub struct ShutdownSignal {
    pub running: AtomicBool,
    pair: Mutex<()>,
    condvar: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            pair: Mutex::new(()),
            condvar: Condvar::new(),
        })
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    fn wait_tick(&self) {
        let guard = self.pair.lock().unwrap();
        let _ = self.condvar.wait_timeout(guard, MASTER_TICK).unwrap();
    }
}

/// Reads every backend-resolved sensor in the plant and publishes its
/// latest value, tagged with the backend's own timestamp.
fn hardware_input(rt: &mut Runtime) {
    use rwchcd_core::backend::{InputKind, InputValue};

    let now = rt.clock.now();
    let backends = &rt.backends;
    let poll = |sensor: &rwchcd_core::sensor::Sensor| {
        let backend = match backends.backend(sensor.backend.backend) {
            Ok(b) => b,
            Err(_) => return,
        };
        match backend.input_value_get(InputKind::Temperature, sensor.backend.id) {
            Ok(InputValue::Temperature(t)) => {
                let at = backend.input_time_get(InputKind::Temperature, sensor.backend.id).unwrap_or(now);
                sensor.publish(t, at);
            }
            _ => {}
        }
    };

    poll(&rt.plant.outdoor_sensor);
    poll(&rt.plant.heatsource_sensor);
    for ce in &rt.plant.circuits {
        poll(&ce.outgoing);
        if let Some(a) = &ce.ambient {
            poll(a);
        }
    }
    for de in &rt.plant.dhwts {
        poll(&de.top);
        poll(&de.bottom);
        if let Some(i) = &de.inlet {
            poll(i);
        }
    }
}

/// Every relay in the plant, named for persistence and carrying its
/// resolved backend id for the output phase. Shared by `hardware_output`
/// (writes `is_on()` to the backend) and `persist_relay_counters` (saves
/// accounting state on shutdown).
fn collect_relays(rt: &Runtime) -> Vec<&Relay> {
    let mut relays = Vec::new();
    for ce in &rt.plant.circuits {
        relays.push(ce.circuit.pump.relay());
        if let Some(v) = &ce.circuit.valve {
            let (open, close) = v.relays();
            relays.push(open);
            relays.push(close);
        }
    }
    for de in &rt.plant.dhwts {
        if let Some(p) = &de.dhwt.feed_pump {
            relays.push(p.relay());
        }
        if let Some(p) = &de.dhwt.recycle_pump {
            relays.push(p.relay());
        }
        if let Some(r) = &de.dhwt.self_heater {
            relays.push(r);
        }
    }
    relays.push(&rt.plant.heatsource.burner);
    if let Some(p) = &rt.plant.heatsource.load_pump {
        relays.push(p.relay());
    }
    relays
}

/// Commits every relay's `is_on()` state to its backend. Called after
/// `Runtime::run_once` so the pipeline's own commit phase (valve
/// integrator, pump dwell) has already settled this iteration's state.
fn hardware_output(rt: &mut Runtime) {
    use rwchcd_core::backend::OutputKind;

    let writes: Vec<_> = collect_relays(rt).into_iter().map(|r| (r.backend, r.is_on())).collect();

    for (resolved, state) in writes {
        if let Ok(backend) = rt.backends.backend_mut(resolved.backend) {
            if let Err(e) = backend.output_state_set(OutputKind::Relay, resolved.id, state) {
                tracing::warn!(error = %e, "failed to commit relay state to backend");
            }
        }
    }
}

/// Saves every relay's accounting counters so the next startup's
/// `setup::build` restores them instead of starting fresh.
fn persist_relay_counters(rt: &Runtime) {
    for r in collect_relays(rt) {
        if let Err(e) = rwchcd_core::persistence::save(&relay_store_key(&r.name), RELAY_SCHEMA_VERSION, &r.counters()) {
            tracing::warn!(relay = %r.name, error = %e, "failed to persist relay counters");
        }
    }
}

/// Runs the master loop to completion (until `signal` requests a stop).
/// Brings the runtime online first and takes it offline on the way out.
///
/// Also spawns the watchdog, scheduler, and timer-job threads for the
/// duration of the loop; all three share `rt` under its read/write lock
/// rather than owning a private copy.
pub fn run(
    rt: Shared,
    signal: Arc<ShutdownSignal>,
    wdog_timeout_s: u64,
    notifier: &mut dyn Notifier,
    schedule: Schedule,
    timer_jobs: Vec<TimerJob>,
) -> Result<()> {
    rt.write().online()?;
    tracing::info!("runtime online");

    let now_cache = rt.read().clock.spawn_cache_updater();
    let beat = watchdog::new_heartbeat(now_cache.load(Ordering::Acquire));
    let watchdog_handle = watchdog::spawn(Arc::clone(&now_cache), Arc::clone(&beat), wdog_timeout_s, Arc::clone(&signal));
    let scheduler_handle = crate::scheduler::spawn(schedule, Arc::clone(&rt), Arc::clone(&signal));
    let timer_handles = crate::timer::spawn(timer_jobs, Arc::clone(&rt), Arc::clone(&signal));

    while signal.running.load(Ordering::SeqCst) {
        let mut guard = rt.write();
        hardware_input(&mut *guard);
        if let Err(e) = guard.run_once() {
            tracing::warn!(error = %e, "control iteration failed");
        }
        hardware_output(&mut *guard);
        guard.alarms_run(notifier);
        beat.store(guard.clock.now(), Ordering::Release);
        drop(guard);

        signal.wait_tick();
    }

    tracing::info!("shutting down, taking runtime offline");
    {
        let mut guard = rt.write();
        guard.offline()?;
        persist_relay_counters(&*guard);
    }
    // Every background thread polls `signal.running` on its own pace and
    // exits by itself; no join needed on the graceful-shutdown path.
    drop(watchdog_handle);
    drop(scheduler_handle);
    drop(timer_handles);
    Ok(())
}

/// Convenience constructor matching the reference backend's shape, used
/// by `main` and by integration tests that want a ready-to-run runtime
/// without hand-wiring a `BackendRegistry`.
pub fn register_reference_backend(backends: &mut rwchcd_core::backend::BackendRegistry, backend: ReferenceBackend) -> usize {
    backends.register("ref", Box::new(backend))
}
