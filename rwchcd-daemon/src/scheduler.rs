//! Weekly schedule: overrides a circuit's or DHWT's runmode by
//! day-of-week and time-of-day. Distinct from the master loop's own
//! tick pacing — this is a user-facing feature (set the living room to
//! `Eco` overnight, the DHWT to `Comfort` before the morning shower),
//! not an internal scheduling primitive.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Timelike;

use rwchcd_core::config::{ScheduleEntryConfig, ScheduleTargetConfig, Weekday};
use rwchcd_core::plant::Plant;
use rwchcd_core::runtime::Shared;

use crate::master::ShutdownSignal;

/// How often the scheduler thread wakes to check the wall clock. Coarser
/// than the master loop's own tick: a minute of slop choosing when an
/// override takes effect is unobservable to anyone reading a
/// thermostat.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

fn minute_of_week(day: Weekday, minute_of_day: u32) -> u32 {
    day.index() * 24 * 60 + minute_of_day.min(24 * 60 - 1)
}

fn chrono_weekday_index(w: chrono::Weekday) -> Weekday {
    match w {
        chrono::Weekday::Mon => Weekday::Monday,
        chrono::Weekday::Tue => Weekday::Tuesday,
        chrono::Weekday::Wed => Weekday::Wednesday,
        chrono::Weekday::Thu => Weekday::Thursday,
        chrono::Weekday::Fri => Weekday::Friday,
        chrono::Weekday::Sat => Weekday::Saturday,
        chrono::Weekday::Sun => Weekday::Sunday,
    }
}

/// A resolved, lookup-ready weekly schedule.
pub struct Schedule {
    entries: Vec<ScheduleEntryConfig>,
}

impl Schedule {
    pub fn new(mut entries: Vec<ScheduleEntryConfig>) -> Self {
        entries.sort_by_key(|e| minute_of_week(e.day, e.minute_of_day));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry at-or-before `now_minute_of_week`, wrapping
    /// to the last entry of the previous week if `now` precedes every
    /// entry this week (e.g. it's Monday 1am and the only entry is
    /// Friday 10pm).
    fn select(&self, now_minute_of_week: u32) -> Option<&ScheduleEntryConfig> {
        self.entries
            .iter()
            .rev()
            .find(|e| minute_of_week(e.day, e.minute_of_day) <= now_minute_of_week)
            .or_else(|| self.entries.last())
    }

    /// Applies the currently-active entry's targets to the plant's
    /// circuits/DHWTs, matched by configured name. Unknown names are
    /// silently skipped — the entry may target an element that was
    /// since removed from the configuration.
    pub fn apply(&self, plant: &mut Plant, now_minute_of_week: u32) {
        let Some(entry) = self.select(now_minute_of_week) else {
            return;
        };
        for target in &entry.targets {
            match target {
                ScheduleTargetConfig::Circuit { name, runmode } => {
                    if let Some(ce) = plant.circuits.iter_mut().find(|ce| &ce.circuit.name == name) {
                        ce.circuit.runmode = *runmode;
                    }
                }
                ScheduleTargetConfig::Dhwt { name, runmode } => {
                    if let Some(de) = plant.dhwts.iter_mut().find(|de| &de.dhwt.name == name) {
                        de.dhwt.runmode = *runmode;
                    }
                }
            }
        }
    }
}

/// Spawns the scheduler thread. An empty schedule still spawns (keeps
/// the shutdown-signal contract uniform with `watchdog`/`timer`) but
/// returns immediately without ever taking the lock.
pub fn spawn(schedule: Schedule, rt: Shared, signal: Arc<ShutdownSignal>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if schedule.is_empty() {
            return;
        }
        loop {
            if !signal.running.load(Ordering::SeqCst) {
                return;
            }
            let now = chrono::Local::now();
            let now_minute_of_week =
                minute_of_week(chrono_weekday_index(now.weekday()), now.time().hour() * 60 + now.time().minute());

            {
                let mut guard = rt.write();
                schedule.apply(&mut guard.plant, now_minute_of_week);
            }

            thread::sleep(POLL_INTERVAL);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwchcd_core::mode::Runmode;

    fn entry(day: Weekday, minute_of_day: u32, name: &str, runmode: Runmode) -> ScheduleEntryConfig {
        ScheduleEntryConfig {
            day,
            minute_of_day,
            targets: vec![ScheduleTargetConfig::Circuit { name: name.into(), runmode }],
        }
    }

    #[test]
    fn selects_most_recent_entry_at_or_before_now() {
        let sched = Schedule::new(vec![
            entry(Weekday::Monday, 6 * 60, "living", Runmode::Comfort),
            entry(Weekday::Monday, 22 * 60, "living", Runmode::Eco),
        ]);

        let noon_monday = minute_of_week(Weekday::Monday, 12 * 60);
        let picked = sched.select(noon_monday).unwrap();
        assert_eq!(picked.minute_of_day, 6 * 60);
    }

    #[test]
    fn wraps_to_previous_week_before_the_first_entry() {
        let sched = Schedule::new(vec![entry(Weekday::Friday, 22 * 60, "living", Runmode::Eco)]);

        let early_monday = minute_of_week(Weekday::Monday, 1 * 60);
        let picked = sched.select(early_monday).unwrap();
        assert_eq!(picked.day, Weekday::Friday);
    }

    #[test]
    fn apply_sets_runmode_on_matching_circuit_by_name() {
        use rwchcd_core::actuator::Pump;
        use rwchcd_core::backend::{ResolvedId, SensorType};
        use rwchcd_core::circuit::{BilinearParams, Circuit, TempLaw};
        use rwchcd_core::heatsource::HeatSource;
        use rwchcd_core::outdoor::Building;
        use rwchcd_core::plant::CircuitEntry;
        use rwchcd_core::sensor::Sensor;
        use rwchcd_core::temp::celsius_to_temp;
        use std::sync::Arc as StdArc;

        let building = Building::new("b", 36000.0, celsius_to_temp(18.0));
        let outdoor = StdArc::new(Sensor::new("outdoor", ResolvedId { backend: 0, id: 0 }, SensorType::Pt1000, 0));
        let burner = rwchcd_core::actuator::Relay::new("burner", ResolvedId { backend: 0, id: 1 }, false, 0);
        let hs = HeatSource::new("boiler", burner, celsius_to_temp(45.0), celsius_to_temp(90.0), celsius_to_temp(100.0));
        let boiler_sensor = StdArc::new(Sensor::new("boiler", ResolvedId { backend: 0, id: 2 }, SensorType::Pt1000, 0));
        let mut plant = Plant::new(building, outdoor, hs, boiler_sensor);

        let templaw = TempLaw::Bilinear(BilinearParams {
            tout1: celsius_to_temp(-5.0),
            twater1: celsius_to_temp(70.0),
            tout2: celsius_to_temp(15.0),
            twater2: celsius_to_temp(35.0),
            nh100: 100,
        });
        let pump = Pump::new("p1", ResolvedId { backend: 0, id: 3 }, 0, 0);
        let mut circuit = Circuit::new("living", celsius_to_temp(20.0), celsius_to_temp(90.0), templaw, pump, None, None);
        circuit.runmode = Runmode::Off;
        plant.circuits.push(CircuitEntry {
            circuit,
            outgoing: StdArc::new(Sensor::new("living_out", ResolvedId { backend: 0, id: 4 }, SensorType::Pt1000, 0)),
            ambient: None,
        });

        let sched = Schedule::new(vec![entry(Weekday::Monday, 6 * 60, "living", Runmode::Comfort)]);
        sched.apply(&mut plant, minute_of_week(Weekday::Monday, 7 * 60));
        assert_eq!(plant.circuits[0].circuit.runmode, Runmode::Comfort);
    }
}
