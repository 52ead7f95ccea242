//! Plant orchestration: drives the outdoor model, every circuit and
//! DHWT, the (single) heat source, and the periodic summer-maintenance
//! override, then commits every actuator for the iteration.

use std::sync::Arc;

use rwchcd_error::{Result, RwchcdError};

use crate::alarms::{AlarmManager, Severity};
use crate::constants::{SUMMER_RUN_DURATION_S, SUMMER_RUN_INTVL_S};
use crate::circuit::Circuit;
use crate::dhwt::Dhwt;
use crate::heatsource::HeatSource;
use crate::outdoor::Building;
use crate::plant_data::PlantData;
use crate::sensor::Sensor;
use crate::temp::NO_REQUEST;
use crate::timekeep::{tk_to_sec, Tick};

/// A circuit plus the sensors its control law reads.
pub struct CircuitEntry {
    pub circuit: Circuit,
    pub outgoing: Arc<Sensor>,
    pub ambient: Option<Arc<Sensor>>,
}

/// A DHWT plus the sensors its charge state machine reads.
pub struct DhwtEntry {
    pub dhwt: Dhwt,
    pub top: Arc<Sensor>,
    pub bottom: Arc<Sensor>,
    pub inlet: Option<Arc<Sensor>>,
}

/// Owns every consumer and the single heat source, and runs one
/// complete iteration of the control pipeline.
pub struct Plant {
    pub building: Building,
    pub outdoor_sensor: Arc<Sensor>,
    pub heatsource: HeatSource,
    pub heatsource_sensor: Arc<Sensor>,
    pub circuits: Vec<CircuitEntry>,
    pub dhwts: Vec<DhwtEntry>,
    pub alarms: AlarmManager,

    last_tick: Option<Tick>,
    summer_maintenance_active: bool,
    summer_maintenance_since: Tick,
    last_summer_run: Tick,
    data: PlantData,
}

impl Plant {
    pub fn new(building: Building, outdoor_sensor: Arc<Sensor>, heatsource: HeatSource, heatsource_sensor: Arc<Sensor>) -> Self {
        Self {
            building,
            outdoor_sensor,
            heatsource,
            heatsource_sensor,
            circuits: Vec::new(),
            dhwts: Vec::new(),
            alarms: AlarmManager::new(),
            last_tick: None,
            summer_maintenance_active: false,
            summer_maintenance_since: 0,
            last_summer_run: 0,
            data: PlantData::default(),
        }
    }

    pub fn data(&self) -> PlantData {
        self.data
    }

    /// Onlines every consumer (which in turn onlines its own pumps and
    /// valves) before the heat source, and attempts every element even
    /// if some fail: a DHWT whose sensor is unusable must not prevent
    /// the rest of the plant from coming online. Every failure is
    /// collected into a single combined error.
    pub fn online(&mut self, now: Tick) -> Result<()> {
        let mut errors = Vec::new();

        for ce in &mut self.circuits {
            if let Err(e) = ce.circuit.online(now) {
                errors.push(format!("circuit {}: {e}", ce.circuit.name));
            }
        }
        for de in &mut self.dhwts {
            if let Err(e) = de.dhwt.online(now) {
                errors.push(format!("dhwt {}: {e}", de.dhwt.name));
            }
        }
        if let Err(e) = self.heatsource.online(self.heatsource_sensor.value()) {
            errors.push(format!("heatsource {}: {e}", self.heatsource.name));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RwchcdError::Generic(format!(
                "{} plant element(s) failed to come online: {}",
                errors.len(),
                errors.join("; ")
            )))
        }
    }

    pub fn offline(&mut self, now: Tick) {
        for ce in &mut self.circuits {
            ce.circuit.offline(now);
        }
        for de in &mut self.dhwts {
            de.dhwt.offline(now);
        }
    }

    /// Runs circuits, then DHWTs, feeds the max heat request to the
    /// source, runs the source, applies summer maintenance, and commits
    /// every valve, pump and relay.
    pub fn run(&mut self, now: Tick) -> Result<()> {
        let dt_s = match self.last_tick {
            Some(prev) => tk_to_sec(now.wrapping_sub(prev)) as f64,
            None => 0.0,
        };
        self.last_tick = Some(now);

        self.building.update(self.outdoor_sensor.value(), dt_s);
        self.data.summer = self.building.summer;
        let mixed = self.building.t_outdoor_mixed();

        let mut max_request = NO_REQUEST;

        for ce in &mut self.circuits {
            ce.circuit.logic(&self.data, mixed);
            let ambient = ce.ambient.as_ref().map(|s| s.value());
            if let Err(e) = ce.circuit.control(ce.outgoing.value(), ambient, &self.data, mixed, now) {
                tracing::warn!(circuit = %ce.circuit.name, error = %e, "circuit control failed");
                self.alarms.raise(format!("circuit.{}", ce.circuit.name), e.to_string(), Severity::Warning, now);
            }
            let hr = ce.circuit.heat_request();
            if hr != NO_REQUEST && (max_request == NO_REQUEST || hr > max_request) {
                max_request = hr;
            }
        }

        for de in &mut self.dhwts {
            let inlet = de
                .inlet
                .as_ref()
                .map(|s| s.value())
                .unwrap_or_else(|| Err(RwchcdError::NotConfigured("no inlet sensor".into())));
            if let Err(e) = de.dhwt.run(de.top.value(), de.bottom.value(), inlet, &self.data, now) {
                tracing::warn!(dhwt = %de.dhwt.name, error = %e, "dhwt control failed");
                self.alarms.raise(format!("dhwt.{}", de.dhwt.name), e.to_string(), Severity::Warning, now);
            }
            let hr = de.dhwt.heat_request();
            if hr != NO_REQUEST && (max_request == NO_REQUEST || hr > max_request) {
                max_request = hr;
            }
        }

        self.heatsource.set_temp_request(max_request);
        if let Err(e) = self.heatsource.logic(self.heatsource_sensor.value(), now) {
            tracing::warn!(error = %e, "heat source logic failed");
            self.alarms.raise(format!("heatsource.{}", self.heatsource.name), e.to_string(), Severity::Warning, now);
        }
        if let Err(e) = self.heatsource.run(self.heatsource_sensor.value(), now) {
            tracing::error!(error = %e, "heat source run failed");
            self.alarms.raise(format!("heatsource.{}", self.heatsource.name), e.to_string(), Severity::Critical, now);
        }

        self.data.could_sleep = self.heatsource.could_sleep();
        self.data.consumer_shift = self.heatsource.consumer_shift();
        self.data.consumer_stop_delay_s = self.heatsource.consumer_stop_delay_s();

        self.run_summer_maintenance(now);
        self.commit(dt_s, now);

        Ok(())
    }

    /// Periodically forces every pump (and circuit valve) open for a
    /// short window while the plant is in summer mode, to keep them
    /// from seizing over a long idle stretch.
    fn run_summer_maintenance(&mut self, now: Tick) {
        self.data.summer_maintenance = false;
        if !self.building.summer {
            self.summer_maintenance_active = false;
            return;
        }

        if !self.summer_maintenance_active
            && tk_to_sec(now.wrapping_sub(self.last_summer_run)) >= SUMMER_RUN_INTVL_S
        {
            self.summer_maintenance_active = true;
            self.summer_maintenance_since = now;
        }

        if !self.summer_maintenance_active {
            return;
        }

        self.data.summer_maintenance = true;
        for ce in &mut self.circuits {
            ce.circuit.pump.request(true, true, now);
            if let Some(v) = ce.circuit.valve.as_mut() {
                v.request_full_open();
            }
        }
        for de in &mut self.dhwts {
            if let Some(p) = de.dhwt.feed_pump.as_mut() {
                p.request(true, true, now);
            }
            if let Some(p) = de.dhwt.recycle_pump.as_mut() {
                p.request(true, true, now);
            }
        }

        if tk_to_sec(now.wrapping_sub(self.summer_maintenance_since)) >= SUMMER_RUN_DURATION_S {
            self.summer_maintenance_active = false;
            self.last_summer_run = now;
        }
    }

    /// Output phase: valves first (so `tick` sees this iteration's
    /// requests), then every pump.
    fn commit(&mut self, dt_s: f64, now: Tick) {
        for ce in &mut self.circuits {
            if let Some(v) = ce.circuit.valve.as_mut() {
                v.logic();
                v.tick(dt_s, now);
            }
        }
        for ce in &mut self.circuits {
            ce.circuit.pump.run(now);
        }
        for de in &mut self.dhwts {
            if let Some(p) = de.dhwt.feed_pump.as_mut() {
                p.run(now);
            }
            if let Some(p) = de.dhwt.recycle_pump.as_mut() {
                p.run(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{Pump, Valve};
    use crate::backend::{ResolvedId, SensorType};
    use crate::circuit::{BilinearParams, TempLaw};
    use crate::mode::Runmode;
    use crate::temp::celsius_to_temp;
    use crate::timekeep::sec_to_tk;

    fn sensor(name: &str) -> Arc<Sensor> {
        Arc::new(Sensor::new(name, ResolvedId { backend: 0, id: 0 }, SensorType::Pt1000, 0))
    }

    fn plant() -> Plant {
        let building = Building::new("b", 36000.0, celsius_to_temp(18.0));
        let outdoor = sensor("outdoor");
        let burner = crate::actuator::Relay::new("burner", ResolvedId { backend: 0, id: 1 }, false, 0);
        let mut hs = HeatSource::new("boiler", burner, celsius_to_temp(45.0), celsius_to_temp(90.0), celsius_to_temp(100.0));
        hs.hysteresis = crate::temp::kelvin_to_delta(6.0);
        hs.runmode = Runmode::Comfort;
        hs.idle_mode = crate::mode::IdleMode::Always;
        let boiler_sensor = sensor("boiler");
        boiler_sensor.publish(celsius_to_temp(60.0), 0);

        let mut p = Plant::new(building, Arc::clone(&outdoor), hs, boiler_sensor);
        outdoor.publish(celsius_to_temp(5.0), 0);

        let templaw = TempLaw::Bilinear(BilinearParams {
            tout1: celsius_to_temp(-5.0),
            twater1: celsius_to_temp(70.0),
            tout2: celsius_to_temp(15.0),
            twater2: celsius_to_temp(35.0),
            nh100: 100,
        });
        let pump = Pump::new("p1", ResolvedId { backend: 0, id: 2 }, 0, 0);
        let mut circuit = Circuit::new("c1", celsius_to_temp(20.0), celsius_to_temp(90.0), templaw, pump, None, None);
        circuit.runmode = Runmode::Comfort;
        let outgoing = sensor("outgoing");
        outgoing.publish(celsius_to_temp(40.0), 0);
        p.circuits.push(CircuitEntry {
            circuit,
            outgoing,
            ambient: None,
        });

        p
    }

    #[test]
    fn max_consumer_request_feeds_the_heat_source() {
        let mut p = plant();
        p.online(0).unwrap();
        p.run(sec_to_tk(1)).unwrap();

        let hr = p.circuits[0].circuit.heat_request();
        assert_ne!(hr, NO_REQUEST);
        // The source picked up a live demand: no longer idle.
        assert!(!p.heatsource.could_sleep());
    }

    #[test]
    fn offline_stops_every_consumer() {
        let mut p = plant();
        p.online(0).unwrap();
        p.run(sec_to_tk(1)).unwrap();
        p.offline(sec_to_tk(2));
        assert_eq!(p.circuits[0].circuit.heat_request(), NO_REQUEST);
    }

    #[test]
    fn summer_maintenance_forces_pump_on_and_expires() {
        let mut p = plant();
        p.online(0).unwrap();
        p.outdoor_sensor.publish(celsius_to_temp(25.0), 0);
        p.circuits[0].circuit.runmode = Runmode::Off;

        // last_summer_run starts at tick 0, so the interval gate only
        // opens once a full SUMMER_RUN_INTVL_S has elapsed.
        let first_run = sec_to_tk(SUMMER_RUN_INTVL_S);
        p.run(first_run).unwrap();
        assert!(p.building.summer);
        assert!(p.data().summer_maintenance);
        assert!(p.circuits[0].circuit.pump.is_on());

        // Once the window's duration has elapsed, the run that observes
        // this deactivates it for every following iteration.
        let past_window = first_run + sec_to_tk(SUMMER_RUN_DURATION_S + 1);
        p.run(past_window).unwrap();
        p.run(past_window + sec_to_tk(1)).unwrap();
        assert!(!p.data().summer_maintenance);
    }

    #[test]
    fn online_attempts_every_element_and_combines_errors() {
        let mut p = plant();
        // Heat source's own sensor was never published: onlining it fails.
        let bad_hs_sensor = sensor("boiler");
        p.heatsource_sensor = bad_hs_sensor;

        let err = p.online(0).unwrap_err();
        assert!(err.to_string().contains("boiler"));
        // Even though the heat source failed, the consumer still onlined.
        assert!(p.circuits[0].circuit.online);
        assert!(p.circuits[0].circuit.pump.online);
    }

    #[test]
    fn valve_commits_after_circuit_control() {
        let mut p = plant();
        let open = ResolvedId { backend: 0, id: 3 };
        let close = ResolvedId { backend: 0, id: 4 };
        let valve = Valve::new("v1", open, close, 60, 5.0, crate::temp::kelvin_to_delta(0.3), 0);
        p.circuits[0].circuit.valve = Some(valve);
        p.circuits[0].circuit.valve_algo = Some(crate::actuator::ValveControlAlgo::bang_bang());
        p.online(0).unwrap();

        p.run(sec_to_tk(1)).unwrap();
        let v = p.circuits[0].circuit.valve.as_ref().unwrap();
        assert!(v.position_pct() > 0.0 || v.actual_action() != crate::actuator::Action::Stop);
    }
}
