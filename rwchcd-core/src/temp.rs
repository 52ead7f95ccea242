//! Fixed-point temperature representation.
//!
//! Every temperature and temperature delta in the engine is carried as a
//! signed integer in units of 1/100 K above absolute zero. Four negative
//! sentinels are reserved and must never reach plain arithmetic; use
//! [`checked`] at every sensor-to-core boundary.

use rwchcd_error::{Result, RwchcdError};

/// A temperature or temperature delta, in 1/100 K above absolute zero.
pub type Temp = i32;

/// Sensor has never produced a value.
pub const TEMPUNSET: Temp = -1;
/// Sensor reads a short circuit.
pub const TEMPSHORT: Temp = -2;
/// Sensor reads an open circuit / disconnection.
pub const TEMPDISCON: Temp = -3;
/// Sensor value failed range/sanity validation.
pub const TEMPINVALID: Temp = -4;

/// A heat source or consumer is not requesting anything.
pub const NO_REQUEST: Temp = TEMPUNSET;

/// A maximal positive consumer-shift, used to pull load off a saturated source.
pub const CONSUMER_SHIFT_MAX: i32 = 100;

/// True if `t` is one of the four reserved sentinels.
pub fn is_sentinel(t: Temp) -> bool {
    matches!(t, TEMPUNSET | TEMPSHORT | TEMPDISCON | TEMPINVALID)
}

/// Rejects sentinels, turning them into the matching sensor-fault error.
pub fn checked(t: Temp) -> Result<Temp> {
    match t {
        TEMPSHORT => Err(RwchcdError::SensorShort("short circuit".into())),
        TEMPDISCON => Err(RwchcdError::SensorDiscon("disconnected".into())),
        TEMPUNSET | TEMPINVALID => Err(RwchcdError::SensorInval("no valid reading".into())),
        t => Ok(t),
    }
}

/// `celsius_to_temp(c) = round((c + 273.15) * 100)`.
pub fn celsius_to_temp(c: f64) -> Temp {
    ((c + 273.15) * 100.0).round() as Temp
}

/// Inverse of [`celsius_to_temp`].
pub fn temp_to_celsius(t: Temp) -> f64 {
    (t as f64) / 100.0 - 273.15
}

/// Converts a delta in Kelvin to the fixed-point delta scale (no offset).
pub fn kelvin_to_delta(k: f64) -> Temp {
    (k * 100.0).round() as Temp
}

/// Inverse of [`kelvin_to_delta`].
pub fn delta_to_kelvin(d: Temp) -> f64 {
    (d as f64) / 100.0
}

/// Clips `t` to `[lo, hi]`. Callers are responsible for checking sentinels first.
pub fn clip(t: Temp, lo: Temp, hi: Temp) -> Temp {
    t.clamp(lo, hi)
}
