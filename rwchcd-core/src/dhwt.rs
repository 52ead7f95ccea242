//! Domestic hot-water tank: charge trip/untrip, overtime lockout,
//! discharge protection, electric self-heater failover.

use rwchcd_error::Result;

use crate::actuator::{Pump, Relay};
use crate::mode::Runmode;
use crate::plant_data::PlantData;
use crate::temp::{self, kelvin_to_delta, Temp, NO_REQUEST};
use crate::timekeep::{tk_to_sec, Tick};

/// A domestic hot-water tank.
pub struct Dhwt {
    pub name: String,
    pub configured: bool,
    pub online: bool,
    pub runmode: Runmode,

    pub limit_tmin: Temp,
    pub limit_tmax: Temp,
    pub limit_wintmax: Temp,
    pub hysteresis: Temp,
    pub t_comfort: Temp,
    pub t_eco: Temp,
    pub t_frostfree: Temp,
    pub temp_inoffset: Temp,
    pub limit_chargetime_s: u64,
    pub electric_failover: bool,

    pub feed_pump: Option<Pump>,
    pub recycle_pump: Option<Pump>,
    pub self_heater: Option<Relay>,

    pub charge_on: bool,
    pub legionella_on: bool,
    pub force_on: bool,
    pub electric_mode: bool,
    pub recycle_on: bool,
    pub charge_overtime: bool,

    mode_since: Tick,
    target_temp: Temp,
    heat_request: Temp,
    /// The live sensor reading the trip/untrip state machine last keyed
    /// off (bottom while deciding whether to trip a charge, top while
    /// deciding whether to untrip one) — also the discharge-protection
    /// reference for the feed pump.
    current_ref: Temp,
}

impl Dhwt {
    pub fn new(name: impl Into<String>, limit_tmin: Temp, limit_tmax: Temp, limit_wintmax: Temp) -> Self {
        Self {
            name: name.into(),
            configured: true,
            online: false,
            runmode: Runmode::Frostfree,
            limit_tmin,
            limit_tmax,
            limit_wintmax,
            hysteresis: 0,
            t_comfort: limit_tmax,
            t_eco: limit_tmax,
            t_frostfree: limit_tmin,
            temp_inoffset: 0,
            limit_chargetime_s: 0,
            electric_failover: false,
            feed_pump: None,
            recycle_pump: None,
            self_heater: None,
            charge_on: false,
            legionella_on: false,
            force_on: false,
            electric_mode: false,
            recycle_on: false,
            charge_overtime: false,
            mode_since: 0,
            target_temp: limit_tmax,
            heat_request: NO_REQUEST,
            current_ref: limit_tmax,
        }
    }

    pub fn heat_request(&self) -> Temp {
        self.heat_request
    }

    pub fn online(&mut self, now: Tick) -> Result<()> {
        self.online = true;
        if let Some(p) = self.feed_pump.as_mut() {
            p.set_online(true, now);
        }
        if let Some(p) = self.recycle_pump.as_mut() {
            p.set_online(true, now);
        }
        Ok(())
    }

    pub fn offline(&mut self, now: Tick) {
        self.online = false;
        self.heat_request = NO_REQUEST;
        self.charge_on = false;
        if let Some(r) = self.self_heater.as_mut() {
            r.set_state(false, 0, now);
            r.update(now);
        }
        if let Some(p) = self.feed_pump.as_mut() {
            p.request(false, true, now);
        }
        if let Some(p) = self.recycle_pump.as_mut() {
            p.request(false, true, now);
        }
    }

    fn select_target(&self) -> Temp {
        let t = match self.runmode {
            Runmode::Eco => self.t_eco,
            Runmode::Frostfree => self.t_frostfree,
            _ => self.t_comfort,
        };
        temp::clip(t, self.limit_tmin, self.limit_tmax)
    }

    /// Runs one iteration of the charge state machine and pump management.
    pub fn run(
        &mut self,
        top: Result<Temp>,
        bottom: Result<Temp>,
        inlet: Result<Temp>,
        plant_data: &PlantData,
        now: Tick,
    ) -> Result<()> {
        self.target_temp = self.select_target();

        // Step 1: both sensors failed -> failsafe.
        if top.is_err() && bottom.is_err() {
            if let Some(p) = self.feed_pump.as_mut() {
                p.request(false, true, now);
            }
            if let Some(p) = self.recycle_pump.as_mut() {
                p.request(false, true, now);
            }
            if let Some(r) = self.self_heater.as_mut() {
                if self.electric_failover {
                    r.set_state(true, 0, now);
                    self.electric_mode = true;
                } else {
                    r.set_state(false, 0, now);
                }
                r.update(now);
            }
            return bottom.and(top).map(|_| ());
        }

        // Step 2: recycle pump follows recycle_on.
        if let Some(p) = self.recycle_pump.as_mut() {
            p.request(self.recycle_on, false, now);
        }

        if !self.charge_on {
            if self.charge_overtime && tk_to_sec(now.wrapping_sub(self.mode_since)) <= self.limit_chargetime_s {
                self.run_feed_pump(inlet, now);
                return Ok(());
            }
            self.charge_overtime = false;

            let reference = bottom.or(top)?;
            self.current_ref = reference;
            let trip = if self.force_on {
                self.target_temp - kelvin_to_delta(1.0)
            } else {
                self.target_temp - self.hysteresis
            };

            if reference < trip {
                if plant_data.could_sleep && self.self_heater.is_some() {
                    self.self_heater.as_mut().unwrap().set_state(true, 0, now);
                    self.self_heater.as_mut().unwrap().update(now);
                    self.electric_mode = true;
                } else {
                    self.electric_mode = false;
                    let feed = temp::clip(
                        self.target_temp + self.temp_inoffset,
                        self.limit_tmin,
                        self.limit_wintmax,
                    );
                    self.heat_request = feed;
                }
                self.charge_on = true;
                self.mode_since = now;
            }
        } else {
            let reference = top.or(bottom)?;
            self.current_ref = reference;
            let mut untrip = reference >= self.target_temp;
            if !self.electric_mode
                && !self.legionella_on
                && tk_to_sec(now.wrapping_sub(self.mode_since)) > self.limit_chargetime_s
            {
                untrip = true;
                self.charge_overtime = true;
            }

            if untrip {
                if let Some(r) = self.self_heater.as_mut() {
                    r.set_state(false, 0, now);
                    r.update(now);
                }
                self.heat_request = NO_REQUEST;
                self.force_on = false;
                self.legionella_on = false;
                self.charge_on = false;
                self.mode_since = now;
            }
        }

        self.run_feed_pump(inlet, now);
        Ok(())
    }

    fn run_feed_pump(&mut self, inlet: Result<Temp>, now: Tick) {
        let Some(pump) = self.feed_pump.as_mut() else {
            return;
        };

        if self.charge_on && !self.electric_mode {
            match inlet {
                Err(_) => {
                    pump.request(true, true, now);
                }
                Ok(inlet_val) => {
                    // Whichever sensor the trip/untrip state machine last
                    // read (bottom pre-trip, top once charging).
                    let reference = self.current_ref;
                    if inlet_val < reference {
                        pump.request(false, true, now);
                    } else if inlet_val >= reference + kelvin_to_delta(1.0) {
                        pump.request(true, true, now);
                    }
                }
            }
        } else {
            match inlet {
                Ok(inlet_val) if inlet_val > self.target_temp => {
                    pump.request(false, false, now);
                }
                _ => {
                    pump.request(false, true, now);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResolvedId;
    use crate::temp::celsius_to_temp;
    use crate::timekeep::sec_to_tk;

    fn dhwt() -> Dhwt {
        let mut d = Dhwt::new("dhw", celsius_to_temp(10.0), celsius_to_temp(60.0), celsius_to_temp(90.0));
        d.hysteresis = kelvin_to_delta(6.0);
        d.t_comfort = celsius_to_temp(55.0);
        d.runmode = Runmode::Comfort;
        d.limit_chargetime_s = 1800;
        d.online(0).unwrap();
        d
    }

    #[test]
    fn charge_overtime_lockout() {
        let mut d = dhwt();
        let pd = PlantData::default();

        // Bottom at 20C trips a charge.
        d.run(Err(rwchcd_error::RwchcdError::SensorInval("x".into())), Ok(celsius_to_temp(20.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, sec_to_tk(0)).unwrap();
        assert!(d.charge_on);

        // 1800s later, tank only reached 45C (< target 55 - hyst 6 = 49): still
        // below untrip threshold via temperature, but overtime forces untrip.
        d.run(Ok(celsius_to_temp(45.0)), Ok(celsius_to_temp(45.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, sec_to_tk(1800)).unwrap();
        assert!(!d.charge_on);
        assert!(d.charge_overtime);
        assert_eq!(d.heat_request(), NO_REQUEST);

        // Still locked out well before the next 1800s elapse.
        d.run(Err(rwchcd_error::RwchcdError::SensorInval("x".into())), Ok(celsius_to_temp(20.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, sec_to_tk(1900)).unwrap();
        assert!(!d.charge_on);

        // After the full lockout window, trip is allowed again.
        d.run(Err(rwchcd_error::RwchcdError::SensorInval("x".into())), Ok(celsius_to_temp(20.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, sec_to_tk(3601)).unwrap();
        assert!(d.charge_on);
    }

    #[test]
    fn both_sensors_failed_triggers_failsafe() {
        let mut d = dhwt();
        d.electric_failover = true;
        let pd = PlantData::default();
        let err = d
            .run(
                Err(rwchcd_error::RwchcdError::SensorDiscon("x".into())),
                Err(rwchcd_error::RwchcdError::SensorDiscon("x".into())),
                Err(rwchcd_error::RwchcdError::SensorDiscon("x".into())),
                &pd,
                0,
            )
            .unwrap_err();
        assert!(err.is_sensor_fault());
        assert!(d.electric_mode);
    }

    #[test]
    fn discharge_protection_uses_live_tank_sensor() {
        let mut d = dhwt();
        d.feed_pump = Some(Pump::new("feed", ResolvedId { backend: 0, id: 0 }, 0, 0));
        let pd = PlantData::default();

        // Bottom at 20C trips a charge; the trip logic's reference (20C)
        // is latched as the live tank reference.
        d.run(Ok(celsius_to_temp(20.0)), Ok(celsius_to_temp(20.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, sec_to_tk(0))
            .unwrap();
        assert!(d.charge_on);

        // Still charging: the untrip check re-reads top (20C, well below
        // the 55C target) as the live reference. A cold inlet below that
        // reference forces the feed pump off to protect against
        // discharging the tank, instead of comparing against the static
        // target-minus-hysteresis threshold.
        d.run(Ok(celsius_to_temp(20.0)), Ok(celsius_to_temp(20.0)), Ok(celsius_to_temp(15.0)), &pd, sec_to_tk(10))
            .unwrap();
        assert!(!d.feed_pump.as_ref().unwrap().relay().requested_on());

        // A warm inlet comfortably above the live reference forces the
        // pump back on.
        d.run(Ok(celsius_to_temp(20.0)), Ok(celsius_to_temp(20.0)), Ok(celsius_to_temp(25.0)), &pd, sec_to_tk(20))
            .unwrap();
        assert!(d.feed_pump.as_ref().unwrap().relay().requested_on());
    }

    #[test]
    fn untrip_on_reaching_target() {
        let mut d = dhwt();
        let pd = PlantData::default();
        d.run(Err(rwchcd_error::RwchcdError::SensorInval("x".into())), Ok(celsius_to_temp(20.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, 0).unwrap();
        assert!(d.charge_on);
        d.run(Ok(celsius_to_temp(56.0)), Ok(celsius_to_temp(56.0)), Err(rwchcd_error::RwchcdError::SensorInval("x".into())), &pd, 10).unwrap();
        assert!(!d.charge_on);
        assert_eq!(d.heat_request(), NO_REQUEST);
    }
}
