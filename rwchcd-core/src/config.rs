//! Serde-based JSON mirror of the plant's configured (as opposed to
//! runtime) state: every tunable an installer sets once and the daemon
//! loads back on every start.
//!
//! This is a plain data description, not the live [`crate::plant::Plant`]
//! itself — the daemon's setup code is what resolves backend/sensor
//! names and constructs the live entities from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rwchcd_error::{Result, RwchcdError};

use crate::actuator::valve_ctrl::ValveControlAlgo;
use crate::circuit::{OutdoorCutoff, TempLaw};
use crate::constants::paths;
use crate::mode::{IdleMode, Runmode};
use crate::temp::Temp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingConfig {
    pub name: String,
    pub outdoor_sensor: String,
    pub tau_s: f64,
    pub limit_tsummer: Temp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub backend: String,
    pub output: String,
    #[serde(default)]
    pub failsafe_on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub name: String,
    pub relay: RelayConfig,
    #[serde(default)]
    pub cooldown_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveConfig {
    pub name: String,
    pub open: RelayConfig,
    pub close: RelayConfig,
    pub ete_time_s: u64,
    #[serde(default)]
    pub dead_band_pct: f64,
    #[serde(default)]
    pub dead_zone: Temp,
    pub algo: ValveControlAlgoConfig,
}

/// JSON-friendly mirror of [`ValveControlAlgo`]'s constructors (the
/// live type carries running state the config format has no use for).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValveControlAlgoConfig {
    BangBang,
    SuccessiveApprox { sample_interval_s: u64, amount_pct: f64 },
    Pi { sample_interval_s: u64, tempin_low: Temp, tempin_high: Temp, tuning_factor: f64 },
}

impl ValveControlAlgoConfig {
    pub fn build(&self) -> ValveControlAlgo {
        match self {
            Self::BangBang => ValveControlAlgo::bang_bang(),
            Self::SuccessiveApprox { sample_interval_s, amount_pct } => {
                ValveControlAlgo::successive_approx(*sample_interval_s, *amount_pct)
            }
            Self::Pi { sample_interval_s, tempin_low, tempin_high, tuning_factor } => {
                ValveControlAlgo::pi(*sample_interval_s, *tempin_low, *tempin_high, *tuning_factor)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub name: String,
    pub outgoing_sensor: String,
    pub ambient_sensor: Option<String>,
    pub limit_wtmin: Temp,
    pub limit_wtmax: Temp,
    #[serde(default)]
    pub t_comfort: Option<Temp>,
    #[serde(default)]
    pub t_eco: Option<Temp>,
    #[serde(default)]
    pub t_frostfree: Option<Temp>,
    #[serde(default)]
    pub set_toffset: Temp,
    #[serde(default)]
    pub temp_inoffset: Temp,
    #[serde(default)]
    pub ambient_factor_pct: f64,
    #[serde(default)]
    pub wtemp_rorh: f64,
    pub templaw: TempLaw,
    #[serde(default)]
    pub outdoor_cutoff: OutdoorCutoff,
    pub pump: PumpConfig,
    pub valve: Option<ValveConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhwtConfig {
    pub name: String,
    pub top_sensor: String,
    pub bottom_sensor: String,
    pub inlet_sensor: Option<String>,
    pub limit_tmin: Temp,
    pub limit_tmax: Temp,
    pub limit_wintmax: Temp,
    #[serde(default)]
    pub hysteresis: Temp,
    #[serde(default)]
    pub t_comfort: Option<Temp>,
    #[serde(default)]
    pub t_eco: Option<Temp>,
    #[serde(default)]
    pub t_frostfree: Option<Temp>,
    #[serde(default)]
    pub temp_inoffset: Temp,
    #[serde(default)]
    pub limit_chargetime_s: u64,
    #[serde(default)]
    pub electric_failover: bool,
    pub feed_pump: Option<PumpConfig>,
    pub recycle_pump: Option<PumpConfig>,
    pub self_heater: Option<RelayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatSourceConfig {
    pub name: String,
    pub sensor: String,
    pub burner: RelayConfig,
    pub load_pump: Option<PumpConfig>,
    pub limit_tmin: Temp,
    pub limit_tmax: Temp,
    pub limit_thardmax: Temp,
    #[serde(default)]
    pub hysteresis: Temp,
    #[serde(default)]
    pub t_freeze: Temp,
    #[serde(default)]
    pub burner_min_time_s: u64,
    #[serde(default)]
    pub consumer_stop_delay_s: u64,
    #[serde(default)]
    pub idle_mode: Option<IdleMode>,
}

/// Chronological-independent weekday, so the schedule's on-disk format
/// does not need `chrono`'s own serde feature; the daemon converts its
/// wall-clock reading to this type at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// 0 = Monday .. 6 = Sunday, the same convention as
    /// `chrono::Weekday::num_days_from_monday`.
    pub fn index(self) -> u32 {
        match self {
            Weekday::Monday => 0,
            Weekday::Tuesday => 1,
            Weekday::Wednesday => 2,
            Weekday::Thursday => 3,
            Weekday::Friday => 4,
            Weekday::Saturday => 5,
            Weekday::Sunday => 6,
        }
    }
}

/// The runmode a schedule entry forces onto a named circuit or DHWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleTargetConfig {
    Circuit { name: String, runmode: Runmode },
    Dhwt { name: String, runmode: Runmode },
}

/// One weekly-recurring override: at `day`/`minute_of_day` (local time),
/// force every listed target to its given runmode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntryConfig {
    pub day: Weekday,
    /// Minutes since local midnight, `0..1440`.
    pub minute_of_day: u32,
    pub targets: Vec<ScheduleTargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    pub building: BuildingConfig,
    pub heatsource: HeatSourceConfig,
    #[serde(default)]
    pub circuits: Vec<CircuitConfig>,
    #[serde(default)]
    pub dhwts: Vec<DhwtConfig>,
    /// Path to an executable forked (with each batch's alarm messages as
    /// argv) when alarms are due for delivery. `None` disables the
    /// notifier; alarms still land in the log either way.
    #[serde(default)]
    pub alarm_notifier: Option<String>,
    /// Weekly runmode overrides, evaluated by the scheduler thread.
    #[serde(default)]
    pub schedule: Vec<ScheduleEntryConfig>,
}

impl PlantConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| RwchcdError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(RwchcdError::from)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| RwchcdError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$XDG_CONFIG_HOME/rwchcd/plant.json`, falling back to `~/.config`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| RwchcdError::misconfigured("no config directory for this user"))?;
    Ok(base.join(paths::CONFIG_DIR_NAME).join(paths::PLANT_CONFIG_FILE))
}
