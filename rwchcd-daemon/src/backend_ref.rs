//! Reference hardware backend: temperature/switch inputs driven by
//! `Arc<AtomicI32>` cells a test harness (or, eventually, a real sysfs
//! poller) can publish into, and relay outputs that just record the
//! requested and committed state. Not a real driver; the shape a real
//! one (onewire, GPIO, MQTT...) would follow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use rwchcd_core::backend::{HardwareBackend, InputId, InputKind, InputValue, OutputId, OutputKind};
use rwchcd_core::timekeep::Tick;
use rwchcd_error::{Result, RwchcdError};

/// A single input cell: the latest raw reading plus the tick it was
/// last written at. `Arc`-shared so an external harness can publish
/// into it directly.
pub struct InputCell {
    pub value: AtomicI32,
    pub updated_at: AtomicI32,
}

impl InputCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            value: AtomicI32::new(0),
            updated_at: AtomicI32::new(0),
        })
    }

    pub fn publish(&self, value: i32, now: Tick) {
        self.value.store(value, Ordering::Release);
        self.updated_at.store(now as i32, Ordering::Release);
    }
}

struct RelayOutput {
    name: String,
    requested: AtomicBool,
    hardware: AtomicBool,
}

/// In-process backend: every temperature input is a raw-ohm or raw-°C
/// reading depending on how the harness chooses to drive it (this
/// backend just forwards the i32 as a [`rwchcd_core::temp::Temp`]
/// directly, skipping RTD conversion — a real backend would read ohms
/// and run [`rwchcd_core::backend::rtd_ohm_to_celsius`] first).
pub struct ReferenceBackend {
    temperature_names: Vec<String>,
    switch_names: Vec<String>,
    relay_names: Vec<String>,
    temperatures: Vec<Arc<InputCell>>,
    switches: Vec<Arc<InputCell>>,
    relays: Vec<RelayOutput>,
    temp_index: HashMap<String, InputId>,
    switch_index: HashMap<String, InputId>,
    relay_index: HashMap<String, OutputId>,
}

impl Default for ReferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self {
            temperature_names: Vec::new(),
            switch_names: Vec::new(),
            relay_names: Vec::new(),
            temperatures: Vec::new(),
            switches: Vec::new(),
            relays: Vec::new(),
            temp_index: HashMap::new(),
            switch_index: HashMap::new(),
            relay_index: HashMap::new(),
        }
    }

    /// Declares a temperature input and returns the cell to publish into.
    pub fn add_temperature(&mut self, name: impl Into<String>) -> Arc<InputCell> {
        let name = name.into();
        let cell = InputCell::new();
        let id = self.temperatures.len();
        self.temp_index.insert(name.clone(), id);
        self.temperature_names.push(name);
        self.temperatures.push(Arc::clone(&cell));
        cell
    }

    /// Declares a switch input and returns the cell to publish into.
    pub fn add_switch(&mut self, name: impl Into<String>) -> Arc<InputCell> {
        let name = name.into();
        let cell = InputCell::new();
        let id = self.switches.len();
        self.switch_index.insert(name.clone(), id);
        self.switch_names.push(name);
        self.switches.push(Arc::clone(&cell));
        cell
    }

    /// Declares a relay output.
    pub fn add_relay(&mut self, name: impl Into<String>) -> OutputId {
        let name = name.into();
        let id = self.relays.len();
        self.relay_index.insert(name.clone(), id);
        self.relay_names.push(name.clone());
        self.relays.push(RelayOutput {
            name,
            requested: AtomicBool::new(false),
            hardware: AtomicBool::new(false),
        });
        id
    }

    /// The committed (post output-phase) state of a relay, for tests
    /// or a status display.
    pub fn relay_hardware_state(&self, id: OutputId) -> Option<bool> {
        self.relays.get(id).map(|r| r.hardware.load(Ordering::Acquire))
    }
}

impl HardwareBackend for ReferenceBackend {
    fn setup(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn online(&mut self) -> Result<()> {
        Ok(())
    }

    fn offline(&mut self) -> Result<()> {
        for r in &self.relays {
            r.requested.store(false, Ordering::Release);
            r.hardware.store(false, Ordering::Release);
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        Ok(())
    }

    fn input_ibn(&self, kind: InputKind, name: &str) -> Result<InputId> {
        let index = match kind {
            InputKind::Temperature => &self.temp_index,
            InputKind::Switch => &self.switch_index,
        };
        index
            .get(name)
            .copied()
            .ok_or_else(|| RwchcdError::NotFound(format!("input {name}")))
    }

    fn output_ibn(&self, kind: OutputKind, name: &str) -> Result<OutputId> {
        match kind {
            OutputKind::Relay => self
                .relay_index
                .get(name)
                .copied()
                .ok_or_else(|| RwchcdError::NotFound(format!("output {name}"))),
        }
    }

    fn input_name(&self, kind: InputKind, id: InputId) -> Result<String> {
        let names = match kind {
            InputKind::Temperature => &self.temperature_names,
            InputKind::Switch => &self.switch_names,
        };
        names
            .get(id)
            .cloned()
            .ok_or_else(|| RwchcdError::NotFound(format!("input id {id}")))
    }

    fn output_name(&self, _kind: OutputKind, id: OutputId) -> Result<String> {
        self.relays
            .get(id)
            .map(|r| r.name.clone())
            .ok_or_else(|| RwchcdError::NotFound(format!("output id {id}")))
    }

    fn input_value_get(&self, kind: InputKind, id: InputId) -> Result<InputValue> {
        match kind {
            InputKind::Temperature => self
                .temperatures
                .get(id)
                .map(|c| InputValue::Temperature(c.value.load(Ordering::Acquire)))
                .ok_or_else(|| RwchcdError::NotFound(format!("temperature id {id}"))),
            InputKind::Switch => self
                .switches
                .get(id)
                .map(|c| InputValue::Switch(c.value.load(Ordering::Acquire) != 0))
                .ok_or_else(|| RwchcdError::NotFound(format!("switch id {id}"))),
        }
    }

    fn input_time_get(&self, kind: InputKind, id: InputId) -> Result<Tick> {
        let cells = match kind {
            InputKind::Temperature => &self.temperatures,
            InputKind::Switch => &self.switches,
        };
        cells
            .get(id)
            .map(|c| c.updated_at.load(Ordering::Acquire) as Tick)
            .ok_or_else(|| RwchcdError::NotFound(format!("input id {id}")))
    }

    fn output_state_set(&mut self, _kind: OutputKind, id: OutputId, state: bool) -> Result<()> {
        let relay = self
            .relays
            .get(id)
            .ok_or_else(|| RwchcdError::NotFound(format!("output id {id}")))?;
        relay.requested.store(state, Ordering::Release);
        // A real backend would coalesce requested states and write them
        // to hardware during a distinct output phase; this reference
        // backend has no physical device to wait for, so it commits
        // immediately.
        relay.hardware.store(state, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_round_trips() {
        let mut b = ReferenceBackend::new();
        let cell = b.add_temperature("outdoor");
        cell.publish(2731, 42);
        let id = b.input_ibn(InputKind::Temperature, "outdoor").unwrap();
        assert_eq!(b.input_value_get(InputKind::Temperature, id).unwrap(), InputValue::Temperature(2731));
        assert_eq!(b.input_time_get(InputKind::Temperature, id).unwrap(), 42);
    }

    #[test]
    fn relay_commits_on_set() {
        let mut b = ReferenceBackend::new();
        let id = b.add_relay("burner");
        assert_eq!(b.relay_hardware_state(id), Some(false));
        b.output_state_set(OutputKind::Relay, id, true).unwrap();
        assert_eq!(b.relay_hardware_state(id), Some(true));
    }

    #[test]
    fn unknown_name_is_not_found() {
        let b = ReferenceBackend::new();
        assert!(matches!(
            b.input_ibn(InputKind::Temperature, "missing"),
            Err(RwchcdError::NotFound(_))
        ));
    }
}
