//! Heating circuit: runmode selection, bilinear water-curve, rate-of-rise
//! limiting, and inter-consumer interference.

use rwchcd_error::{Result, RwchcdError};
use serde::{Deserialize, Serialize};

use crate::actuator::valve_ctrl::ValveControlAlgo;
use crate::actuator::{Pump, Valve};
use crate::constants::{ROR_TIME_CONSTANT_S, ROR_UPDATE_INTERVAL_S};
use crate::mode::Runmode;
use crate::plant_data::PlantData;
use crate::temp::{self, celsius_to_temp, kelvin_to_delta, Temp, NO_REQUEST};
use crate::timekeep::{tk_to_sec, Tick};

/// Parameters for the bilinear water curve (the one templaw in use today).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BilinearParams {
    pub tout1: Temp,
    pub twater1: Temp,
    pub tout2: Temp,
    pub twater2: Temp,
    /// Non-linearity coefficient, x100 (120 == 1.20).
    pub nh100: i32,
}

/// A circuit's outdoor-to-water-temperature mapping. Modeled as a
/// closed, tagged variant rather than a trait object: the set of laws
/// is small and fixed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TempLaw {
    Bilinear(BilinearParams),
}

impl TempLaw {
    pub fn water_temp(&self, t_outdoor_mixed: Temp, target_ambient: Temp) -> Temp {
        match self {
            TempLaw::Bilinear(p) => bilinear_water_temp(p, t_outdoor_mixed, target_ambient),
        }
    }
}

fn bilinear_water_temp(p: &BilinearParams, t_outdoor_mixed: Temp, target_ambient: Temp) -> Temp {
    let tout1 = p.tout1 as f64;
    let twater1 = p.twater1 as f64;
    let tout2 = p.tout2 as f64;
    let twater2 = p.twater2 as f64;
    let c20 = celsius_to_temp(20.0) as f64;

    let m = (twater2 - twater1) / (tout2 - tout1);
    let b = twater2 - tout2 * m;
    let toutw20 = (c20 - b) / m;
    let toutinfl = toutw20 - 0.30 * (toutw20 - tout1);
    let tlin = toutinfl * m + b;
    let nh = p.nh100 as f64 / 100.0;
    let twaterinfl = tlin + (tlin - c20) * (nh - 1.0);

    let outdoor = t_outdoor_mixed as f64;
    let water = if outdoor <= toutinfl {
        lerp(tout1, twater1, toutinfl, twaterinfl, outdoor)
    } else {
        lerp(toutinfl, twaterinfl, tout2, twater2, outdoor)
    };

    let shift = (target_ambient as f64 - c20) * (1.0 - m);
    (water + shift).round() as Temp
}

fn lerp(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    if (x2 - x1).abs() < f64::EPSILON {
        return y2;
    }
    y1 + (y2 - y1) * (x - x1) / (x2 - x1)
}

/// Outdoor-temperature cut-off thresholds, one per runmode, plus a
/// shared hysteresis band.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutdoorCutoff {
    pub comfort: Option<Temp>,
    pub eco: Option<Temp>,
    pub frostfree: Option<Temp>,
    pub hysteresis: Temp,
}

impl OutdoorCutoff {
    fn threshold_for(&self, runmode: Runmode) -> Option<Temp> {
        match runmode {
            Runmode::Comfort => self.comfort,
            Runmode::Eco => self.eco,
            Runmode::Frostfree => self.frostfree,
            _ => None,
        }
    }
}

/// What [`Circuit::logic`] decided for this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectiveMode {
    /// Offline: zero heat request, closed valve, stopped pump.
    Offline,
    /// OFF with a pending consumer-stop-delay: suppress the heat
    /// request but keep driving the valve towards the held target.
    HoldOldTarget,
    Manual,
    Active,
    Invalid,
}

/// A hydraulic heating circuit.
pub struct Circuit {
    pub name: String,
    pub configured: bool,
    pub online: bool,
    pub runmode: Runmode,

    pub limit_wtmin: Temp,
    pub limit_wtmax: Temp,
    pub t_comfort: Temp,
    pub t_eco: Temp,
    pub t_frostfree: Temp,
    pub set_toffset: Temp,
    pub temp_inoffset: Temp,
    /// Percent influence of the ambient sensor correction, if present.
    pub ambient_factor_pct: f64,
    /// K per hour.
    pub wtemp_rorh: f64,

    pub templaw: TempLaw,
    pub outdoor_cutoff: OutdoorCutoff,

    pub pump: Pump,
    pub valve: Option<Valve>,
    pub valve_algo: Option<ValveControlAlgo>,

    target_ambient: Temp,
    target_wtemp: Temp,
    heat_request: Temp,
    out_hoff: bool,
    rorh_last_target: Option<Temp>,
    rorh_last_update: Tick,
    effective: EffectiveMode,
}

impl Circuit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        limit_wtmin: Temp,
        limit_wtmax: Temp,
        templaw: TempLaw,
        pump: Pump,
        valve: Option<Valve>,
        valve_algo: Option<ValveControlAlgo>,
    ) -> Self {
        Self {
            name: name.into(),
            configured: true,
            online: false,
            runmode: Runmode::Frostfree,
            limit_wtmin,
            limit_wtmax,
            t_comfort: celsius_to_temp(20.0),
            t_eco: celsius_to_temp(17.0),
            t_frostfree: celsius_to_temp(7.0),
            set_toffset: 0,
            temp_inoffset: 0,
            ambient_factor_pct: 0.0,
            wtemp_rorh: 0.0,
            templaw,
            outdoor_cutoff: OutdoorCutoff::default(),
            pump,
            valve,
            valve_algo,
            target_ambient: celsius_to_temp(20.0),
            target_wtemp: 0,
            heat_request: NO_REQUEST,
            out_hoff: false,
            rorh_last_target: None,
            rorh_last_update: 0,
            effective: EffectiveMode::Invalid,
        }
    }

    pub fn heat_request(&self) -> Temp {
        self.heat_request
    }

    pub fn online(&mut self, now: Tick) -> Result<()> {
        self.online = true;
        self.pump.set_online(true, now);
        if let Some(v) = self.valve.as_mut() {
            v.online(now);
        }
        Ok(())
    }

    pub fn offline(&mut self, now: Tick) {
        self.online = false;
        self.heat_request = NO_REQUEST;
        if let Some(v) = self.valve.as_mut() {
            v.offline(now);
        }
        self.pump.request(false, true, now);
    }

    /// Runmode dispatch and outdoor-cutoff tracking; no sensor reads.
    pub fn logic(&mut self, plant_data: &PlantData, t_outdoor_mixed: Temp) {
        self.effective = match self.runmode {
            Runmode::Off => {
                if self.target_wtemp != 0 && plant_data.consumer_stop_delay_s > 0 {
                    EffectiveMode::HoldOldTarget
                } else {
                    EffectiveMode::Offline
                }
            }
            Runmode::Manual => EffectiveMode::Manual,
            Runmode::Comfort | Runmode::Eco | Runmode::Frostfree | Runmode::Dhwonly => {
                EffectiveMode::Active
            }
            Runmode::Auto => EffectiveMode::Invalid,
        };

        let request_ambient = match self.runmode {
            Runmode::Eco => self.t_eco,
            Runmode::Frostfree => self.t_frostfree,
            _ => self.t_comfort,
        };
        self.target_ambient = request_ambient + self.set_toffset;

        if let Some(threshold) = self.outdoor_cutoff.threshold_for(self.runmode) {
            let hyst = self.outdoor_cutoff.hysteresis;
            if !self.out_hoff && t_outdoor_mixed > threshold + hyst / 2 {
                self.out_hoff = true;
            } else if self.out_hoff && t_outdoor_mixed < threshold - hyst / 2 {
                self.out_hoff = false;
            }
        } else {
            self.out_hoff = false;
        }

        if self.out_hoff && self.effective == EffectiveMode::Active {
            self.effective = EffectiveMode::Offline;
        }
    }

    /// The active control algorithm: steps 1-9 of the outdoor-to-valve pipeline.
    pub fn control(
        &mut self,
        outgoing: Result<Temp>,
        ambient: Option<Result<Temp>>,
        plant_data: &PlantData,
        t_outdoor_mixed: Temp,
        now: Tick,
    ) -> Result<()> {
        match self.effective {
            EffectiveMode::Invalid => return Err(RwchcdError::InvalidMode),
            EffectiveMode::Offline => {
                self.heat_request = NO_REQUEST;
                if let Some(v) = self.valve.as_mut() {
                    v.request_full_close();
                }
                self.pump.request(false, false, now);
                return Ok(());
            }
            EffectiveMode::Manual => {
                self.heat_request = NO_REQUEST;
                if let Some(v) = self.valve.as_mut() {
                    v.request_stop();
                }
                self.pump.request(true, true, now);
                return Ok(());
            }
            EffectiveMode::HoldOldTarget => {
                self.heat_request = NO_REQUEST;
                if let (Some(valve), Some(algo)) = (self.valve.as_mut(), self.valve_algo.as_mut()) {
                    if let Ok(outgoing_val) = outgoing {
                        algo.update(valve, self.target_wtemp, outgoing_val, now);
                    }
                }
                return Ok(());
            }
            EffectiveMode::Active => {}
        }

        // Step 1: read outgoing water temp; engage failsafe on fault.
        let outgoing_val = match outgoing {
            Ok(v) => v,
            Err(e) => {
                if let Some(v) = self.valve.as_mut() {
                    v.request_full_close();
                }
                self.pump.request(true, true, now);
                return Err(e);
            }
        };

        // Step 2: ensure pump on (non-forced).
        self.pump.request(true, false, now);

        // Step 3: templaw.
        let mut water = self.templaw.water_temp(t_outdoor_mixed, self.target_ambient);

        if self.ambient_factor_pct != 0.0 {
            if let Some(Ok(ambient_val)) = ambient {
                let err_k = temp::delta_to_kelvin(self.target_ambient - ambient_val);
                water += kelvin_to_delta(self.ambient_factor_pct / 100.0 * err_k);
            }
        }

        // Step 4: rate-of-rise.
        water = self.apply_ror(water, outgoing_val, now);

        // Step 5: clip to limits.
        water = temp::clip(water, self.limit_wtmin, self.limit_wtmax);

        // Step 6: save uninfluenced target, apply interferences.
        let mut saved_target = water;
        if plant_data.consumer_stop_delay_s > 0 {
            saved_target = saved_target.max(self.target_wtemp);
        }
        if plant_data.consumer_shift != 0 {
            saved_target += kelvin_to_delta(0.25 * plant_data.consumer_shift as f64);
        }

        // Step 7: clip again to the upper limit.
        saved_target = saved_target.min(self.limit_wtmax);
        self.target_wtemp = saved_target;

        // Step 8: emit heat request.
        self.heat_request = saved_target + self.temp_inoffset;

        // Step 9: drive the valve.
        if let (Some(valve), Some(algo)) = (self.valve.as_mut(), self.valve_algo.as_mut()) {
            algo.update(valve, self.heat_request, outgoing_val, now);
        }

        Ok(())
    }

    fn apply_ror(&mut self, requested: Temp, outgoing: Temp, now: Tick) -> Temp {
        if self.wtemp_rorh <= 0.0 {
            return requested;
        }
        let Some(last_target) = self.rorh_last_target else {
            self.rorh_last_target = Some(outgoing);
            self.rorh_last_update = now;
            return requested;
        };

        if requested <= last_target {
            self.rorh_last_target = Some(requested);
            return requested;
        }

        if tk_to_sec(now.wrapping_sub(self.rorh_last_update)) < ROR_UPDATE_INTERVAL_S {
            return requested.min(last_target);
        }
        self.rorh_last_update = now;

        let ceiling = last_target as f64 + kelvin_to_delta(self.wtemp_rorh) as f64;
        let dt = ROR_UPDATE_INTERVAL_S as f64;
        let alpha = dt / (ROR_TIME_CONSTANT_S + dt);
        let new_last_target = (last_target as f64 + alpha * (ceiling - last_target as f64)).round() as Temp;
        self.rorh_last_target = Some(new_last_target);
        requested.min(new_last_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResolvedId;

    fn pump() -> Pump {
        Pump::new("p", ResolvedId { backend: 0, id: 0 }, 0, 0)
    }

    fn circuit() -> Circuit {
        let templaw = TempLaw::Bilinear(BilinearParams {
            tout1: celsius_to_temp(-5.0),
            twater1: celsius_to_temp(70.0),
            tout2: celsius_to_temp(15.0),
            twater2: celsius_to_temp(35.0),
            nh100: 120,
        });
        let mut c = Circuit::new("c1", celsius_to_temp(20.0), celsius_to_temp(90.0), templaw, pump(), None, None);
        c.runmode = Runmode::Comfort;
        c.online(0).unwrap();
        c
    }

    #[test]
    fn bilinear_concave_lift_raises_cold_side_target() {
        let nonlinear = TempLaw::Bilinear(BilinearParams {
            tout1: celsius_to_temp(-5.0),
            twater1: celsius_to_temp(70.0),
            tout2: celsius_to_temp(15.0),
            twater2: celsius_to_temp(35.0),
            nh100: 120,
        });
        let linear = TempLaw::Bilinear(BilinearParams {
            tout1: celsius_to_temp(-5.0),
            twater1: celsius_to_temp(70.0),
            tout2: celsius_to_temp(15.0),
            twater2: celsius_to_temp(35.0),
            nh100: 100,
        });
        let outdoor = celsius_to_temp(0.0);
        let ambient = celsius_to_temp(20.0);
        let lifted = nonlinear.water_temp(outdoor, ambient);
        let pure_linear = linear.water_temp(outdoor, ambient);
        assert!(
            lifted > pure_linear,
            "nH>1 should raise the cold-side target: lifted={lifted} linear={pure_linear}"
        );
    }

    #[test]
    fn rate_of_rise_seeds_then_limits() {
        let mut c = circuit();
        c.wtemp_rorh = 10.0;
        let outgoing = celsius_to_temp(30.0);
        // First call seeds the tracker and passes the request through.
        let first = c.apply_ror(celsius_to_temp(60.0), outgoing, 0);
        assert_eq!(first, celsius_to_temp(60.0));

        let limited = c.apply_ror(celsius_to_temp(60.0), outgoing, 60);
        let ceiling_k = 30.0 + 10.0 * (1.0 - (-60.0f64 / 3600.0).exp());
        assert!(temp::temp_to_celsius(limited) < 60.0);
        assert!(temp::temp_to_celsius(limited) <= ceiling_k + 0.05);
    }

    #[test]
    fn heat_request_within_bounds_when_active() {
        let mut c = circuit();
        c.logic(&PlantData::default(), celsius_to_temp(5.0));
        c.control(Ok(celsius_to_temp(40.0)), None, &PlantData::default(), celsius_to_temp(5.0), 10)
            .unwrap();
        let hr = c.heat_request();
        assert!(hr >= c.limit_wtmin + c.temp_inoffset);
        assert!(hr <= c.limit_wtmax + c.temp_inoffset);
    }

    #[test]
    fn off_with_no_stop_delay_yields_no_request() {
        let mut c = circuit();
        c.runmode = Runmode::Off;
        c.logic(&PlantData::default(), celsius_to_temp(5.0));
        c.control(Ok(celsius_to_temp(40.0)), None, &PlantData::default(), celsius_to_temp(5.0), 10)
            .unwrap();
        assert_eq!(c.heat_request(), NO_REQUEST);
    }

    #[test]
    fn sensor_fault_engages_failsafe() {
        let mut c = circuit();
        c.logic(&PlantData::default(), celsius_to_temp(5.0));
        let err = c
            .control(
                Err(RwchcdError::SensorShort("x".into())),
                None,
                &PlantData::default(),
                celsius_to_temp(5.0),
                10,
            )
            .unwrap_err();
        assert!(err.is_sensor_fault());
        assert!(c.pump.relay().requested_on()); // run() would commit this to is_on()
    }
}
