//! Runtime: the process-wide owner of the backend registry, the plant,
//! and the system's lifecycle mode.
//!
//! Exactly one `Runtime` is ever constructed, by the daemon's `main`;
//! nothing below this layer reaches back into a global to find it.

use std::sync::Arc;

use parking_lot::RwLock;
use rwchcd_error::{Result, RwchcdError};

use crate::alarms::Notifier;
use crate::backend::BackendRegistry;
use crate::mode::SystemMode;
use crate::plant::Plant;
use crate::timekeep::Timekeep;

/// A `Runtime` shared between the master loop and the scheduler/timer
/// threads. The master loop takes a write lock each iteration — `run_once`,
/// `hardware_input`/`hardware_output` all mutate the runtime, so a plain
/// read lock (as the reference loop takes) is not available to us under
/// Rust's aliasing rules; see `DESIGN.md`.
pub type Shared = Arc<RwLock<Runtime>>;

pub struct Runtime {
    pub backends: BackendRegistry,
    pub plant: Plant,
    pub clock: Timekeep,
    mode: SystemMode,
}

impl Runtime {
    pub fn new(backends: BackendRegistry, plant: Plant) -> Self {
        Self {
            backends,
            plant,
            clock: Timekeep::new(),
            mode: SystemMode::Init,
        }
    }

    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    /// Transitions the lifecycle mode, rejecting jumps the daemon's
    /// startup/shutdown sequence never makes.
    fn set_mode(&mut self, mode: SystemMode) -> Result<()> {
        use SystemMode::*;
        let ok = matches!(
            (self.mode, mode),
            (Init, Online)
                | (Online, Online)
                | (Online, Run)
                | (Run, Run)
                | (Run, Offline)
                | (Online, Offline)
                | (Offline, Online)
        );
        if !ok {
            return Err(RwchcdError::InvalidMode);
        }
        self.mode = mode;
        Ok(())
    }

    /// Brings every backend and every plant element online.
    pub fn online(&mut self) -> Result<()> {
        self.set_mode(SystemMode::Online)?;
        self.backends.online_all()?;
        self.plant.online(self.clock.now())
    }

    /// Runs one iteration of the control pipeline; called by the master loop.
    pub fn run_once(&mut self) -> Result<()> {
        self.set_mode(SystemMode::Run)?;
        self.plant.run(self.clock.now())
    }

    /// Stops the plant and every backend, and marks the system offline.
    pub fn offline(&mut self) -> Result<()> {
        self.plant.offline(self.clock.now());
        self.backends.offline_all();
        self.set_mode(SystemMode::Offline)
    }

    /// Throttled alarm delivery; called once per master-loop iteration.
    /// No-op unless the alarm manager's throttle window has elapsed and
    /// something is pending.
    pub fn alarms_run(&mut self, notifier: &mut dyn Notifier) {
        self.plant.alarms.drain(notifier, self.clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::Relay;
    use crate::backend::ResolvedId;
    use crate::heatsource::HeatSource;
    use crate::outdoor::Building;
    use crate::sensor::Sensor;
    use crate::temp::celsius_to_temp;
    use std::sync::Arc;

    fn runtime() -> Runtime {
        let building = Building::new("b", 36000.0, celsius_to_temp(18.0));
        let outdoor = Arc::new(Sensor::new(
            "outdoor",
            ResolvedId { backend: 0, id: 0 },
            crate::backend::SensorType::Pt1000,
            0,
        ));
        outdoor.publish(celsius_to_temp(5.0), 0);
        let burner = Relay::new("burner", ResolvedId { backend: 0, id: 1 }, false, 0);
        let hs = HeatSource::new("boiler", burner, celsius_to_temp(45.0), celsius_to_temp(90.0), celsius_to_temp(100.0));
        let boiler_sensor = Arc::new(Sensor::new(
            "boiler",
            ResolvedId { backend: 0, id: 2 },
            crate::backend::SensorType::Pt1000,
            0,
        ));
        boiler_sensor.publish(celsius_to_temp(60.0), 0);
        let plant = Plant::new(building, outdoor, hs, boiler_sensor);
        Runtime::new(BackendRegistry::new(), plant)
    }

    #[test]
    fn cannot_run_before_online() {
        let mut rt = runtime();
        assert!(rt.run_once().is_err());
    }

    #[test]
    fn lifecycle_progresses_in_order() {
        let mut rt = runtime();
        rt.online().unwrap();
        assert_eq!(rt.mode(), SystemMode::Online);
        rt.run_once().unwrap();
        assert_eq!(rt.mode(), SystemMode::Run);
        rt.run_once().unwrap();
        assert_eq!(rt.mode(), SystemMode::Run);
        rt.offline().unwrap();
        assert_eq!(rt.mode(), SystemMode::Offline);
    }

    #[test]
    fn cannot_jump_straight_to_run_from_init() {
        let mut rt = runtime();
        assert!(rt.run_once().is_err());
        assert_eq!(rt.mode(), SystemMode::Init);
    }
}
