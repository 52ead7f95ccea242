//! Temperature sensor entity.
//!
//! A sensor's value and update timestamp are plain atomics: published by
//! a backend's input phase with release semantics, read by the control
//! loop with acquire semantics. No lock is ever needed between the two.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use rwchcd_error::Result;

use crate::backend::{ResolvedId, SensorType};
use crate::temp::{self, Temp, TEMPUNSET};
use crate::timekeep::Tick;

/// A single named temperature sensor.
pub struct Sensor {
    pub name: String,
    pub backend: ResolvedId,
    pub sensor_type: SensorType,
    /// Calibration offset, added after the sentinel check.
    pub offset: Temp,
    last_value: AtomicI32,
    last_update: AtomicU32,
}

impl Sensor {
    pub fn new(name: impl Into<String>, backend: ResolvedId, sensor_type: SensorType, offset: Temp) -> Self {
        Self {
            name: name.into(),
            backend,
            sensor_type,
            offset,
            last_value: AtomicI32::new(TEMPUNSET),
            last_update: AtomicU32::new(0),
        }
    }

    /// Called by the input phase to publish a freshly sampled value.
    pub fn publish(&self, value: Temp, at: Tick) {
        self.last_value.store(value, Ordering::Release);
        self.last_update.store(at, Ordering::Release);
    }

    /// The raw last-published value, including sentinels.
    pub fn raw_value(&self) -> Temp {
        self.last_value.load(Ordering::Acquire)
    }

    pub fn last_update(&self) -> Tick {
        self.last_update.load(Ordering::Acquire)
    }

    /// The calibrated value, or the sensor-fault error that raw_value represents.
    pub fn value(&self) -> Result<Temp> {
        let raw = temp::checked(self.raw_value())?;
        Ok(raw + self.offset)
    }

    pub fn is_usable(&self) -> bool {
        self.value().is_ok()
    }
}
