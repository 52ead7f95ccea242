//! Single-stage boiler heat source: antifreeze, hard-max safety,
//! hysteresis, minimum burn time, consumer-shift/stop-delay broadcast.

use rwchcd_error::{Result, RwchcdError};

use crate::actuator::{Pump, Relay};
use crate::mode::{IdleMode, Runmode};
use crate::temp::{self, kelvin_to_delta, Temp, CONSUMER_SHIFT_MAX, NO_REQUEST};
use crate::timekeep::{tk_to_sec, Tick};

/// A single-stage boiler.
pub struct HeatSource {
    pub name: String,
    pub configured: bool,
    pub online: bool,
    pub runmode: Runmode,
    pub idle_mode: IdleMode,
    pub hysteresis: Temp,
    pub limit_tmin: Temp,
    pub limit_tmax: Temp,
    pub limit_thardmax: Temp,
    pub t_freeze: Temp,
    pub burner_min_time_s: u64,
    pub consumer_stop_delay_s: u64,

    pub burner: Relay,
    pub load_pump: Option<Pump>,

    antifreeze: bool,
    could_sleep: bool,
    target_temp: Temp,
    consumer_shift: i32,
    temp_request: Temp,
    target_consumer_stop_delay_s: u64,
    last_run: Option<Tick>,
}

impl HeatSource {
    pub fn new(name: impl Into<String>, burner: Relay, limit_tmin: Temp, limit_tmax: Temp, limit_thardmax: Temp) -> Self {
        assert!(limit_tmin < limit_tmax && limit_tmax < limit_thardmax);
        Self {
            name: name.into(),
            configured: true,
            online: false,
            runmode: Runmode::Frostfree,
            idle_mode: IdleMode::Always,
            hysteresis: 0,
            limit_tmin,
            limit_tmax,
            limit_thardmax,
            t_freeze: 0,
            burner_min_time_s: 0,
            consumer_stop_delay_s: 0,
            burner,
            load_pump: None,
            antifreeze: false,
            could_sleep: false,
            target_temp: NO_REQUEST,
            consumer_shift: 0,
            temp_request: NO_REQUEST,
            target_consumer_stop_delay_s: 0,
            last_run: None,
        }
    }

    pub fn online(&mut self, sensor: Result<Temp>) -> Result<()> {
        temp::checked(sensor.unwrap_or(Temp::MIN))?;
        self.online = true;
        Ok(())
    }

    /// Called by the plant before [`HeatSource::logic`]: the max of all
    /// connected consumers' heat requests.
    pub fn set_temp_request(&mut self, t: Temp) {
        self.temp_request = t;
    }

    pub fn could_sleep(&self) -> bool {
        self.could_sleep
    }

    pub fn consumer_shift(&self) -> i32 {
        self.consumer_shift
    }

    pub fn consumer_stop_delay_s(&self) -> u64 {
        self.target_consumer_stop_delay_s
    }

    /// Antifreeze tracking and target-temperature selection.
    pub fn logic(&mut self, sensor: Result<Temp>, now: Tick) -> Result<()> {
        let reading = match sensor {
            Ok(v) => v,
            Err(e) => {
                self.failsafe(now);
                return Err(e);
            }
        };

        if reading <= self.t_freeze {
            self.antifreeze = true;
        } else if reading > self.limit_tmin + self.hysteresis / 2 {
            self.antifreeze = false;
        }

        self.target_temp = match self.runmode {
            Runmode::Off => {
                if self.antifreeze {
                    self.limit_tmin
                } else {
                    NO_REQUEST
                }
            }
            Runmode::Comfort | Runmode::Eco | Runmode::Dhwonly | Runmode::Frostfree => {
                self.temp_request
            }
            Runmode::Manual => self.limit_tmax,
            Runmode::Auto => NO_REQUEST,
        };

        if self.target_temp == NO_REQUEST {
            self.target_temp = match self.idle_mode {
                IdleMode::Never => self.limit_tmin,
                IdleMode::Frostonly => {
                    if self.runmode == Runmode::Frostfree {
                        NO_REQUEST
                    } else {
                        self.limit_tmin
                    }
                }
                // Passthrough: no demand means the source is free to idle.
                IdleMode::Always => NO_REQUEST,
            };
        }

        self.could_sleep = self.target_temp == NO_REQUEST;

        if self.target_temp != NO_REQUEST {
            self.target_temp = temp::clip(self.target_temp, self.limit_tmin, self.limit_tmax);
        }

        Ok(())
    }

    fn failsafe(&mut self, now: Tick) {
        self.burner.set_state(false, 0, now);
        self.burner.update(now);
        if let Some(p) = self.load_pump.as_mut() {
            p.request(true, true, now);
            p.run(now);
        }
    }

    /// Safety checks, consumer-shift broadcast, burner hysteresis.
    pub fn run(&mut self, sensor: Result<Temp>, now: Tick) -> Result<()> {
        let dt_s = match self.last_run {
            Some(prev) => tk_to_sec(now.wrapping_sub(prev)),
            None => 0,
        };
        self.last_run = Some(now);

        let reading = match sensor {
            Ok(v) if v <= self.limit_thardmax => v,
            _ => {
                self.failsafe(now);
                self.consumer_shift = CONSUMER_SHIFT_MAX;
                return Err(RwchcdError::Safety("reading exceeds hard-max or sensor unusable".into()));
            }
        };

        if reading < self.limit_tmin {
            let delta_k = temp::delta_to_kelvin(reading - self.limit_tmin);
            self.consumer_shift = (10.0 * delta_k).round() as i32;
        } else {
            self.consumer_shift = 0;
        }

        if let Some(p) = self.load_pump.as_mut() {
            p.request(true, false, now);
            p.run(now);
        }

        if self.target_temp == NO_REQUEST {
            self.burner.set_state(false, self.burner_min_time_s, now);
        } else {
            let trip = (self.target_temp - self.hysteresis / 2).max(self.limit_tmin);
            let untrip = (self.target_temp + self.hysteresis / 2).min(self.limit_tmax);

            if reading < trip {
                self.burner.set_state(true, self.burner_min_time_s, now);
            } else if reading > untrip {
                self.burner.set_state(false, self.burner_min_time_s, now);
            }
        }

        let outcome = self.burner.update(now);
        if self.burner.is_on() {
            self.target_consumer_stop_delay_s = self.consumer_stop_delay_s;
        } else {
            self.target_consumer_stop_delay_s = self.target_consumer_stop_delay_s.saturating_sub(dt_s);
        }

        let _ = outcome;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::relay::Relay;
    use crate::backend::ResolvedId;
    use crate::temp::celsius_to_temp;
    use crate::timekeep::sec_to_tk;

    fn boiler() -> HeatSource {
        let burner = Relay::new("burner", ResolvedId { backend: 0, id: 0 }, false, 0);
        let mut h = HeatSource::new("boiler", burner, celsius_to_temp(45.0), celsius_to_temp(90.0), celsius_to_temp(100.0));
        h.hysteresis = kelvin_to_delta(6.0);
        h.burner_min_time_s = 240;
        h.runmode = Runmode::Comfort;
        h.online(Ok(celsius_to_temp(65.0))).unwrap();
        h
    }

    #[test]
    fn hysteresis_trip_and_untrip_respect_min_time() {
        let mut h = boiler();
        h.set_temp_request(celsius_to_temp(70.0));
        h.logic(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        assert!(h.burner.is_on());

        // Raise to 74C with no time elapsed: stays ON (dwell not elapsed).
        h.logic(Ok(celsius_to_temp(74.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(74.0)), sec_to_tk(0)).unwrap();
        assert!(h.burner.is_on());

        // After 240s at 74C: flips OFF.
        h.logic(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        h.run(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        assert!(!h.burner.is_on());

        // Back to 66C immediately: stays OFF until another 240s.
        h.logic(Ok(celsius_to_temp(66.0)), sec_to_tk(240)).unwrap();
        h.run(Ok(celsius_to_temp(66.0)), sec_to_tk(240)).unwrap();
        assert!(!h.burner.is_on());

        h.logic(Ok(celsius_to_temp(66.0)), sec_to_tk(480)).unwrap();
        h.run(Ok(celsius_to_temp(66.0)), sec_to_tk(480)).unwrap();
        assert!(h.burner.is_on());
    }

    #[test]
    fn hard_max_triggers_safety() {
        let mut h = boiler();
        h.set_temp_request(celsius_to_temp(70.0));
        h.logic(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();

        let err = h.run(Ok(celsius_to_temp(102.0)), sec_to_tk(1)).unwrap_err();
        assert!(matches!(err, RwchcdError::Safety(_)));
        assert!(!h.burner.requested_on());
        assert_eq!(h.consumer_shift(), CONSUMER_SHIFT_MAX);

        // Back to normal next iteration: no residual safety state.
        h.logic(Ok(celsius_to_temp(80.0)), sec_to_tk(2)).unwrap();
        h.run(Ok(celsius_to_temp(80.0)), sec_to_tk(2)).unwrap();
        assert_ne!(h.consumer_shift(), CONSUMER_SHIFT_MAX);
    }

    #[test]
    fn consumer_stop_delay_counts_down_in_elapsed_seconds_not_per_call() {
        let mut h = boiler();
        h.consumer_stop_delay_s = 500;
        h.set_temp_request(celsius_to_temp(70.0));

        // Burner on: target delay latches to the configured value.
        h.logic(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        assert!(h.burner.is_on());
        assert_eq!(h.consumer_stop_delay_s(), 500);

        // Raise to 74C with no time elapsed: stays ON (dwell not elapsed),
        // delay re-latches to the same value.
        h.logic(Ok(celsius_to_temp(74.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(74.0)), sec_to_tk(0)).unwrap();
        assert_eq!(h.consumer_stop_delay_s(), 500);

        // After 240s at 74C: flips OFF. 240s have elapsed since the last
        // `run()` call, so the delay drops by 240, not by 1.
        h.logic(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        h.run(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        assert!(!h.burner.is_on());
        assert_eq!(h.consumer_stop_delay_s(), 260);

        // A second call at the same tick: zero elapsed time, zero
        // decrement — a flat per-call `-= 1` would have dropped this.
        h.logic(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        h.run(Ok(celsius_to_temp(74.0)), sec_to_tk(240)).unwrap();
        assert_eq!(h.consumer_stop_delay_s(), 260);

        // Burner comes back on: delay re-latches to the full value.
        h.logic(Ok(celsius_to_temp(66.0)), sec_to_tk(480)).unwrap();
        h.run(Ok(celsius_to_temp(66.0)), sec_to_tk(480)).unwrap();
        assert!(h.burner.is_on());
        assert_eq!(h.consumer_stop_delay_s(), 500);
    }

    #[test]
    fn sensor_fault_forces_burner_off() {
        let mut h = boiler();
        h.set_temp_request(celsius_to_temp(70.0));
        h.logic(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        h.run(Ok(celsius_to_temp(65.0)), sec_to_tk(0)).unwrap();
        assert!(h.burner.is_on());

        let err = h.logic(Err(RwchcdError::SensorDiscon("x".into())), sec_to_tk(1)).unwrap_err();
        assert!(err.is_sensor_fault());
        assert!(!h.burner.requested_on());
    }
}
