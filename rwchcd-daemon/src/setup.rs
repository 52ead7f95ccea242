//! Wires a loaded [`rwchcd_core::config::PlantConfig`] into a live
//! [`rwchcd_core::backend::BackendRegistry`] and [`rwchcd_core::plant::Plant`].
//!
//! The core deliberately stops at parsed config plus live entities; it
//! is the daemon's job to resolve sensor/relay names against whichever
//! backends it has registered and build the owned graph. Today there is
//! exactly one backend, the in-process reference one, so every config
//! name is resolved against it directly.

use std::sync::Arc;

use rwchcd_core::actuator::relay::RelayCounters;
use rwchcd_core::actuator::{Pump, Relay, Valve};
use rwchcd_core::backend::{BackendRegistry, InputKind, OutputKind};
use rwchcd_core::circuit::Circuit;
use rwchcd_core::config::{CircuitConfig, DhwtConfig, PlantConfig, PumpConfig, RelayConfig, ValveConfig};
use rwchcd_core::dhwt::Dhwt;
use rwchcd_core::heatsource::HeatSource;
use rwchcd_core::outdoor::Building;
use rwchcd_core::persistence;
use rwchcd_core::plant::{CircuitEntry, DhwtEntry, Plant};
use rwchcd_core::sensor::Sensor;
use rwchcd_core::timekeep::Tick;
use rwchcd_error::Result;

use crate::backend_ref::ReferenceBackend;

const REF_BACKEND_NAME: &str = "ref";

/// Schema tag for persisted relay counters; bumped if `RelayCounters`'s
/// shape ever changes incompatibly.
pub(crate) const RELAY_SCHEMA_VERSION: &str = "relay-v1";

/// Every relay's accounting is persisted under its own key so a restart
/// restores cycles/on-off seconds rather than starting fresh.
pub(crate) fn relay_store_key(name: &str) -> String {
    format!("relay.{name}")
}

fn load_relay_counters(name: &str) -> RelayCounters {
    persistence::load(&relay_store_key(name), RELAY_SCHEMA_VERSION).unwrap_or_default()
}

/// Declares every input/output name the config references, on a fresh
/// reference backend, and registers it. Must run before any `resolve_*`
/// call.
fn declare_backend(config: &PlantConfig) -> ReferenceBackend {
    let mut backend = ReferenceBackend::new();

    backend.add_temperature(config.building.outdoor_sensor.as_str());
    backend.add_temperature(config.heatsource.sensor.as_str());
    declare_relay(&mut backend, &config.heatsource.burner);
    if let Some(pump) = &config.heatsource.load_pump {
        declare_relay(&mut backend, &pump.relay);
    }

    for c in &config.circuits {
        backend.add_temperature(c.outgoing_sensor.as_str());
        if let Some(a) = &c.ambient_sensor {
            backend.add_temperature(a.as_str());
        }
        declare_relay(&mut backend, &c.pump.relay);
        if let Some(v) = &c.valve {
            declare_relay(&mut backend, &v.open);
            declare_relay(&mut backend, &v.close);
        }
    }

    for d in &config.dhwts {
        backend.add_temperature(d.top_sensor.as_str());
        backend.add_temperature(d.bottom_sensor.as_str());
        if let Some(i) = &d.inlet_sensor {
            backend.add_temperature(i.as_str());
        }
        if let Some(p) = &d.feed_pump {
            declare_relay(&mut backend, &p.relay);
        }
        if let Some(p) = &d.recycle_pump {
            declare_relay(&mut backend, &p.relay);
        }
        if let Some(r) = &d.self_heater {
            declare_relay(&mut backend, r);
        }
    }

    backend
}

fn declare_relay(backend: &mut ReferenceBackend, cfg: &RelayConfig) {
    backend.add_relay(cfg.output.as_str());
}

fn resolve_sensor(backends: &BackendRegistry, name: &str, sensor_type: rwchcd_core::backend::SensorType, offset: rwchcd_core::temp::Temp) -> Result<Arc<Sensor>> {
    let resolved = backends.resolve_input(REF_BACKEND_NAME, InputKind::Temperature, name)?;
    Ok(Arc::new(Sensor::new(name.to_string(), resolved, sensor_type, offset)))
}

fn build_relay(backends: &BackendRegistry, name: &str, cfg: &RelayConfig, now: Tick) -> Result<Relay> {
    let resolved = backends.resolve_output(REF_BACKEND_NAME, OutputKind::Relay, &cfg.output)?;
    let mut relay = Relay::new(name.to_string(), resolved, cfg.failsafe_on, now);
    relay.restore(load_relay_counters(name));
    Ok(relay)
}

fn build_pump(backends: &BackendRegistry, cfg: &PumpConfig, now: Tick) -> Result<Pump> {
    let resolved = backends.resolve_output(REF_BACKEND_NAME, OutputKind::Relay, &cfg.relay.output)?;
    let mut pump = Pump::new(cfg.name.as_str(), resolved, cfg.cooldown_s, now);
    pump.restore_counters(load_relay_counters(&format!("pump.{}", cfg.name)));
    Ok(pump)
}

fn build_valve(backends: &BackendRegistry, cfg: &ValveConfig, now: Tick) -> Result<Valve> {
    let open = backends.resolve_output(REF_BACKEND_NAME, OutputKind::Relay, &cfg.open.output)?;
    let close = backends.resolve_output(REF_BACKEND_NAME, OutputKind::Relay, &cfg.close.output)?;
    let mut valve = Valve::new(cfg.name.as_str(), open, close, cfg.ete_time_s, cfg.dead_band_pct, cfg.dead_zone, now);
    valve.restore_counters(
        load_relay_counters(&format!("valve.{}.open", cfg.name)),
        load_relay_counters(&format!("valve.{}.close", cfg.name)),
    );
    Ok(valve)
}

fn build_circuit(backends: &BackendRegistry, cfg: &CircuitConfig, now: Tick) -> Result<CircuitEntry> {
    let pump = build_pump(backends, &cfg.pump, now)?;
    let (valve, valve_algo) = match &cfg.valve {
        Some(vc) => (Some(build_valve(backends, vc, now)?), Some(vc.algo.build())),
        None => (None, None),
    };
    let mut circuit = Circuit::new(cfg.name.as_str(), cfg.limit_wtmin, cfg.limit_wtmax, cfg.templaw, pump, valve, valve_algo);
    circuit.outdoor_cutoff = cfg.outdoor_cutoff.clone();
    circuit.set_toffset = cfg.set_toffset;
    circuit.temp_inoffset = cfg.temp_inoffset;
    circuit.ambient_factor_pct = cfg.ambient_factor_pct;
    circuit.wtemp_rorh = cfg.wtemp_rorh;
    if let Some(t) = cfg.t_comfort {
        circuit.t_comfort = t;
    }
    if let Some(t) = cfg.t_eco {
        circuit.t_eco = t;
    }
    if let Some(t) = cfg.t_frostfree {
        circuit.t_frostfree = t;
    }

    let outgoing = resolve_sensor(backends, &cfg.outgoing_sensor, rwchcd_core::backend::SensorType::Pt1000, 0)?;
    let ambient = match &cfg.ambient_sensor {
        Some(name) => Some(resolve_sensor(backends, name, rwchcd_core::backend::SensorType::Pt1000, 0)?),
        None => None,
    };

    Ok(CircuitEntry { circuit, outgoing, ambient })
}

fn build_dhwt(backends: &BackendRegistry, cfg: &DhwtConfig, now: Tick) -> Result<DhwtEntry> {
    let mut dhwt = Dhwt::new(cfg.name.as_str(), cfg.limit_tmin, cfg.limit_tmax, cfg.limit_wintmax);
    dhwt.hysteresis = cfg.hysteresis;
    dhwt.temp_inoffset = cfg.temp_inoffset;
    dhwt.limit_chargetime_s = cfg.limit_chargetime_s;
    dhwt.electric_failover = cfg.electric_failover;
    if let Some(t) = cfg.t_comfort {
        dhwt.t_comfort = t;
    }
    if let Some(t) = cfg.t_eco {
        dhwt.t_eco = t;
    }
    if let Some(t) = cfg.t_frostfree {
        dhwt.t_frostfree = t;
    }
    if let Some(p) = &cfg.feed_pump {
        dhwt.feed_pump = Some(build_pump(backends, p, now)?);
    }
    if let Some(p) = &cfg.recycle_pump {
        dhwt.recycle_pump = Some(build_pump(backends, p, now)?);
    }
    if let Some(r) = &cfg.self_heater {
        dhwt.self_heater = Some(build_relay(backends, &format!("{}.self_heater", cfg.name), r, now)?);
    }

    let top = resolve_sensor(backends, &cfg.top_sensor, rwchcd_core::backend::SensorType::Pt1000, 0)?;
    let bottom = resolve_sensor(backends, &cfg.bottom_sensor, rwchcd_core::backend::SensorType::Pt1000, 0)?;
    let inlet = match &cfg.inlet_sensor {
        Some(name) => Some(resolve_sensor(backends, name, rwchcd_core::backend::SensorType::Pt1000, 0)?),
        None => None,
    };

    Ok(DhwtEntry { dhwt, top, bottom, inlet })
}

/// Builds the registry (with the reference backend registered and
/// onlined-but-not-yet-called `online()`) plus the fully wired plant.
pub fn build(config: &PlantConfig, now: Tick) -> Result<(BackendRegistry, Plant)> {
    let backend = declare_backend(config);
    let mut backends = BackendRegistry::new();
    backends.register(REF_BACKEND_NAME, Box::new(backend));

    let outdoor_sensor = resolve_sensor(&backends, &config.building.outdoor_sensor, rwchcd_core::backend::SensorType::Pt1000, 0)?;
    let building = Building::new(config.building.name.as_str(), config.building.tau_s, config.building.limit_tsummer);

    let burner = build_relay(&backends, "burner", &config.heatsource.burner, now)?;
    let mut heatsource = HeatSource::new(config.heatsource.name.as_str(), burner, config.heatsource.limit_tmin, config.heatsource.limit_tmax, config.heatsource.limit_thardmax);
    heatsource.hysteresis = config.heatsource.hysteresis;
    heatsource.t_freeze = config.heatsource.t_freeze;
    heatsource.burner_min_time_s = config.heatsource.burner_min_time_s;
    heatsource.consumer_stop_delay_s = config.heatsource.consumer_stop_delay_s;
    if let Some(mode) = config.heatsource.idle_mode {
        heatsource.idle_mode = mode;
    }
    if let Some(p) = &config.heatsource.load_pump {
        heatsource.load_pump = Some(build_pump(&backends, p, now)?);
    }
    let heatsource_sensor = resolve_sensor(&backends, &config.heatsource.sensor, rwchcd_core::backend::SensorType::Pt1000, 0)?;

    let mut plant = Plant::new(building, outdoor_sensor, heatsource, heatsource_sensor);

    for c in &config.circuits {
        plant.circuits.push(build_circuit(&backends, c, now)?);
    }
    for d in &config.dhwts {
        plant.dhwts.push(build_dhwt(&backends, d, now)?);
    }

    Ok((backends, plant))
}
