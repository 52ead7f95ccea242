//! Hardware backend abstraction.
//!
//! A backend is a named plug-in that exposes inputs (temperature,
//! switch) and outputs (relay) under string names. The core resolves
//! names to opaque per-backend ids exactly once, at online time, and
//! never touches names again on the hot path.

use std::collections::HashMap;

use rwchcd_error::{Result, RwchcdError};

use crate::temp::Temp;
use crate::timekeep::Tick;

/// Kind of input resolved through [`HardwareBackend::input_ibn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Temperature,
    Switch,
}

/// Kind of output resolved through [`HardwareBackend::output_ibn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Relay,
}

/// Dense, per-backend, opaque input id.
pub type InputId = usize;
/// Dense, per-backend, opaque output id.
pub type OutputId = usize;

/// A sampled input value; which variant is valid depends on the
/// [`InputKind`] it was resolved under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputValue {
    Temperature(Temp),
    Switch(bool),
}

/// Interface every hardware backend must implement.
///
/// Lifecycle is `setup` (validate config) → `online` (connect, spawn any
/// I/O threads) → ... → `offline` (disconnect) → `exit` (release
/// resources). Backends publish input values with release semantics;
/// the core reads them with acquire semantics, so a reader never sees a
/// value older than the backend's last successful publish.
pub trait HardwareBackend: Send + Sync {
    fn setup(&mut self, name: &str) -> Result<()>;
    fn online(&mut self) -> Result<()>;
    fn offline(&mut self) -> Result<()>;
    fn exit(&mut self) -> Result<()>;

    fn input_ibn(&self, kind: InputKind, name: &str) -> Result<InputId>;
    fn output_ibn(&self, kind: OutputKind, name: &str) -> Result<OutputId>;

    fn input_name(&self, kind: InputKind, id: InputId) -> Result<String>;
    fn output_name(&self, kind: OutputKind, id: OutputId) -> Result<String>;

    fn input_value_get(&self, kind: InputKind, id: InputId) -> Result<InputValue>;
    fn input_time_get(&self, kind: InputKind, id: InputId) -> Result<Tick>;

    /// Requests a new output state; does not itself drive the hardware.
    /// A later output phase call coalesces and commits pending writes.
    fn output_state_set(&mut self, kind: OutputKind, id: OutputId, state: bool) -> Result<()>;
}

/// A resolved (backend, resource) pair, cached once at online time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedId {
    pub backend: usize,
    pub id: usize,
}

/// Owns every configured backend and resolves `backend_name.resource_name`
/// strings to [`ResolvedId`]s.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn HardwareBackend>>,
    names: HashMap<String, usize>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Box<dyn HardwareBackend>) -> usize {
        let idx = self.backends.len();
        self.backends.push(backend);
        self.names.insert(name.into(), idx);
        idx
    }

    pub fn backend_index(&self, name: &str) -> Result<usize> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| RwchcdError::NotFound(format!("backend {name}")))
    }

    pub fn backend(&self, idx: usize) -> Result<&dyn HardwareBackend> {
        self.backends
            .get(idx)
            .map(|b| b.as_ref())
            .ok_or_else(|| RwchcdError::NotFound(format!("backend index {idx}")))
    }

    pub fn backend_mut(&mut self, idx: usize) -> Result<&mut Box<dyn HardwareBackend>> {
        self.backends
            .get_mut(idx)
            .ok_or_else(|| RwchcdError::NotFound(format!("backend index {idx}")))
    }

    pub fn resolve_input(&self, backend: &str, kind: InputKind, resource: &str) -> Result<ResolvedId> {
        let idx = self.backend_index(backend)?;
        let id = self.backend(idx)?.input_ibn(kind, resource)?;
        Ok(ResolvedId { backend: idx, id })
    }

    pub fn resolve_output(&self, backend: &str, kind: OutputKind, resource: &str) -> Result<ResolvedId> {
        let idx = self.backend_index(backend)?;
        let id = self.backend(idx)?.output_ibn(kind, resource)?;
        Ok(ResolvedId { backend: idx, id })
    }

    pub fn online_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for b in self.backends.iter_mut() {
            if let Err(e) = b.online() {
                tracing::warn!(error = %e, "backend failed to come online");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn offline_all(&mut self) {
        for b in self.backends.iter_mut() {
            if let Err(e) = b.offline() {
                tracing::warn!(error = %e, "backend failed to go offline cleanly");
            }
        }
    }
}

/// RTD sensor element, selecting the Callendar-Van Dusen quadratic fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SensorType {
    #[serde(rename = "PT1000")]
    Pt1000,
    #[serde(rename = "NI1000")]
    Ni1000,
}

struct RtdCoeffs {
    r0: f64,
    a: f64,
    b: f64,
}

impl SensorType {
    fn coeffs(self) -> RtdCoeffs {
        match self {
            SensorType::Pt1000 => {
                let alpha = 3.850e-3;
                let delta = 1.4999;
                RtdCoeffs {
                    r0: 1000.0,
                    a: alpha + alpha * delta / 100.0,
                    b: -alpha * delta / 1e4,
                }
            }
            SensorType::Ni1000 => RtdCoeffs {
                r0: 1000.0,
                a: 5.485e-3,
                b: 6.650e-6,
            },
        }
    }
}

/// Converts a resistance reading to °C via the quadratic Callendar-Van
/// Dusen fit for `sensor_type`.
pub fn rtd_ohm_to_celsius(sensor_type: SensorType, ohm: f64) -> f64 {
    let RtdCoeffs { r0, a, b } = sensor_type.coeffs();
    let under_sqrt = r0 * r0 * a * a - 4.0 * r0 * b * (r0 - ohm);
    (-r0 * a + under_sqrt.sqrt()) / (2.0 * r0 * b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt1000_at_zero_celsius() {
        // By definition R(0C) = R0 for a PT1000.
        let c = rtd_ohm_to_celsius(SensorType::Pt1000, 1000.0);
        assert!(c.abs() < 0.1, "expected ~0C, got {c}");
    }

    #[test]
    fn pt1000_monotonic() {
        let c0 = rtd_ohm_to_celsius(SensorType::Pt1000, 1000.0);
        let c1 = rtd_ohm_to_celsius(SensorType::Pt1000, 1100.0);
        assert!(c1 > c0);
    }

    #[test]
    fn ni1000_at_zero_celsius() {
        let c = rtd_ohm_to_celsius(SensorType::Ni1000, 1000.0);
        assert!(c.abs() < 0.1, "expected ~0C, got {c}");
    }
}
