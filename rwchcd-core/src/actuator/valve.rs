//! Motorised three-way mixing valve.
//!
//! Position is modelled as an integrator driven by two relays (open,
//! close) under break-before-make switching. [`Valve`] owns its two
//! relays directly rather than looking them up through a registry —
//! the same direct-ownership shape the actuator layer uses for
//! [`crate::actuator::pump::Pump`].

use serde::{Deserialize, Serialize};

use crate::backend::ResolvedId;
use crate::temp::Temp;
use crate::timekeep::Tick;

use super::relay::Relay;

/// Direction of travel (or none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Stop,
    Open,
    Close,
}

/// A motorised mixing valve with position estimation.
pub struct Valve {
    pub name: String,
    pub configured: bool,
    pub online: bool,
    /// End-to-end travel time, full stroke.
    pub ete_time_s: u64,
    /// Dead-band, in percent of travel, used by the PI control law.
    pub dead_band_pct: f64,
    /// Dead-zone around the target output temperature, in 1/100 K.
    pub dead_zone: Temp,

    /// Estimated position, in tenths of a percent (0..1000).
    position_tenths: i32,
    /// Remaining course to travel, signed tenths of a percent.
    target_course_tenths: i32,
    requested_action: Action,
    actual_action: Action,
    acc_open_s: f64,
    acc_close_s: f64,
    /// Set once an end-stop has been confirmed by travel time; further
    /// motion in that direction is suppressed until a reversal.
    true_pos: bool,

    open_relay: Relay,
    close_relay: Relay,
}

/// Courseof a full-stroke demand, expressed in percent (matches the
/// reference control laws' use of a 120% overtravel margin to guarantee
/// the end-stop is reached).
pub const FULL_COURSE_PCT: f64 = 120.0;

impl Valve {
    pub fn new(
        name: impl Into<String>,
        open_backend: ResolvedId,
        close_backend: ResolvedId,
        ete_time_s: u64,
        dead_band_pct: f64,
        dead_zone: Temp,
        now: Tick,
    ) -> Self {
        let name = name.into();
        Self {
            open_relay: Relay::new(format!("{name}.open"), open_backend, false, now),
            close_relay: Relay::new(format!("{name}.close"), close_backend, false, now),
            name,
            configured: true,
            online: false,
            ete_time_s: ete_time_s.max(1),
            dead_band_pct,
            dead_zone,
            position_tenths: 0,
            target_course_tenths: 0,
            requested_action: Action::Stop,
            actual_action: Action::Stop,
            acc_open_s: 0.0,
            acc_close_s: 0.0,
            true_pos: false,
        }
    }

    pub fn position_pct(&self) -> f64 {
        self.position_tenths as f64 / 10.0
    }

    pub fn actual_action(&self) -> Action {
        self.actual_action
    }

    pub fn true_pos(&self) -> bool {
        self.true_pos
    }

    /// The open and close relays, for the output phase to read their
    /// backend ids and committed state.
    pub fn relays(&self) -> (&Relay, &Relay) {
        (&self.open_relay, &self.close_relay)
    }

    /// Merges persisted counters into the open/close relays, before onlining.
    pub fn restore_counters(&mut self, open: super::relay::RelayCounters, close: super::relay::RelayCounters) {
        self.open_relay.restore(open);
        self.close_relay.restore(close);
    }

    /// Resets to STOP then demands a full close to calibrate position.
    pub fn online(&mut self, now: Tick) {
        self.online = true;
        self.requested_action = Action::Stop;
        self.request_full_close();
        let _ = now;
    }

    pub fn offline(&mut self, now: Tick) {
        self.request_full_close();
        self.tick(0.0, now);
        self.online = false;
    }

    pub fn request_stop(&mut self) {
        self.requested_action = Action::Stop;
        self.target_course_tenths = 0;
    }

    pub fn request_full_open(&mut self) {
        self.request_course(Action::Open, FULL_COURSE_PCT);
    }

    pub fn request_full_close(&mut self) {
        self.request_course(Action::Close, FULL_COURSE_PCT);
    }

    /// Requests a move of `course_pct` percent in `action`'s direction.
    /// Suppressed (turned into a stop) if the valve already confirmed an
    /// end-stop in that same direction.
    pub fn request_course(&mut self, action: Action, course_pct: f64) {
        if action == Action::Stop {
            self.request_stop();
            return;
        }
        if self.true_pos && action == self.actual_action {
            self.request_stop();
            return;
        }
        self.requested_action = action;
        self.target_course_tenths = (course_pct * 10.0).round() as i32;
    }

    /// End-stop limiter: called once per iteration before [`Valve::tick`].
    /// Clamps an in-flight request that would otherwise drive further
    /// into an already-confirmed end-stop.
    pub fn logic(&mut self) {
        if self.true_pos && self.requested_action == self.actual_action {
            self.requested_action = Action::Stop;
            self.target_course_tenths = 0;
        }
    }

    /// Integrator: advances position, manages break-before-make relay
    /// switching, and updates end-stop accumulators. `dt_s` is the
    /// elapsed time since the previous call.
    pub fn tick(&mut self, dt_s: f64, now: Tick) {
        if !self.online {
            return;
        }

        if self.requested_action != self.actual_action {
            // Break-before-make.
            self.open_relay.set_state(false, 0, now);
            self.close_relay.set_state(false, 0, now);
            self.open_relay.update(now);
            self.close_relay.update(now);

            let reversed = self.actual_action != Action::Stop
                && self.requested_action != Action::Stop
                && self.requested_action != self.actual_action;

            match self.requested_action {
                Action::Open => {
                    self.open_relay.set_state(true, 0, now);
                    self.open_relay.update(now);
                }
                Action::Close => {
                    self.close_relay.set_state(true, 0, now);
                    self.close_relay.update(now);
                }
                Action::Stop => {}
            }

            if reversed {
                self.acc_open_s = 0.0;
                self.acc_close_s = 0.0;
                self.true_pos = false;
            }
            self.actual_action = self.requested_action;
        }

        if self.actual_action == Action::Stop || dt_s <= 0.0 {
            return;
        }

        let step_tenths = dt_s * 1000.0 / self.ete_time_s as f64;
        let dir: f64 = if self.actual_action == Action::Open { 1.0 } else { -1.0 };

        self.position_tenths = (self.position_tenths as f64 + dir * step_tenths)
            .round()
            .clamp(0.0, 1000.0) as i32;

        let remaining = self.target_course_tenths as f64 - dir * step_tenths;
        self.target_course_tenths = remaining.round() as i32;

        if remaining.abs() < step_tenths / 2.0 {
            self.requested_action = Action::Stop;
        }

        match self.actual_action {
            Action::Open => {
                self.acc_open_s += dt_s;
                if self.acc_open_s >= 3.0 * self.ete_time_s as f64 {
                    self.true_pos = true;
                }
            }
            Action::Close => {
                self.acc_close_s += dt_s;
                if self.acc_close_s >= 3.0 * self.ete_time_s as f64 {
                    self.true_pos = true;
                }
            }
            Action::Stop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valve() -> Valve {
        let mut v = Valve::new(
            "v1",
            ResolvedId { backend: 0, id: 0 },
            ResolvedId { backend: 0, id: 1 },
            100,
            5.0,
            crate::temp::kelvin_to_delta(0.3),
            0,
        );
        v.online(0);
        v.tick(0.0, 0);
        v
    }

    #[test]
    fn position_stays_in_bounds() {
        let mut v = valve();
        v.request_full_open();
        for t in 1..2000 {
            v.tick(1.0, t as Tick);
            assert!((0.0..=1000.0).contains(&(v.position_tenths as f64)));
        }
        assert!(v.position_pct() >= 99.0);
    }

    #[test]
    fn true_pos_asserted_after_triple_ete_and_suppresses_further_motion() {
        let mut v = valve();
        v.request_full_open();
        for t in 1..=400 {
            v.tick(1.0, t as Tick);
        }
        assert!(v.true_pos());
        // Another open request in the same (pinned) direction is suppressed.
        v.request_full_open();
        assert_eq!(v.requested_action, Action::Stop);
    }

    #[test]
    fn reversal_resets_accumulators() {
        let mut v = valve();
        v.request_full_open();
        for t in 1..=50 {
            v.tick(1.0, t as Tick);
        }
        assert!(v.acc_open_s > 0.0);
        v.request_full_close();
        v.tick(1.0, 51);
        assert_eq!(v.acc_open_s, 0.0);
        assert!(!v.true_pos());
    }

    #[test]
    fn stop_near_target_course() {
        let mut v = valve();
        v.request_course(Action::Open, 1.0); // tiny course
        v.tick(1.0, 1);
        assert_eq!(v.requested_action, Action::Stop);
    }
}
