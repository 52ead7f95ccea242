//! Stateful relay: the base actuator primitive.
//!
//! A relay tracks a requested and an actual (hardware) on/off state
//! separately. `set_state` only ever changes the request, subject to a
//! minimum dwell time; `update` is the one call, made once per output
//! phase, that is allowed to flip the hardware state and roll the
//! accounting counters.

use serde::{Deserialize, Serialize};

use crate::backend::ResolvedId;
use crate::timekeep::{tk_to_sec, Tick};

/// Result of a `set_state` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Accepted (or already in the requested state).
    Ok,
    /// Rejected: dwell not yet elapsed. Carries the remaining seconds.
    DwellRemaining(u64),
}

/// Result of an `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    None,
    TurnedOn,
    TurnedOff,
}

/// Accumulated counters, serializable for persistence and mergeable via
/// [`Relay::restore`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RelayCounters {
    pub cumulated_on_s: u64,
    pub cumulated_off_s: u64,
    pub cycles: u64,
}

/// A stateful relay with cooldown/dwell accounting.
pub struct Relay {
    pub name: String,
    pub backend: ResolvedId,
    /// State the backend must drive the hardware to if the process dies.
    pub failsafe_on: bool,
    requested_on: bool,
    is_on: bool,
    since: Tick,
    counters: RelayCounters,
}

impl Relay {
    pub fn new(name: impl Into<String>, backend: ResolvedId, failsafe_on: bool, now: Tick) -> Self {
        Self {
            name: name.into(),
            backend,
            failsafe_on,
            requested_on: false,
            is_on: false,
            since: now,
            counters: RelayCounters::default(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn requested_on(&self) -> bool {
        self.requested_on
    }

    pub fn counters(&self) -> RelayCounters {
        self.counters
    }

    /// Seconds since the last accepted hardware transition.
    pub fn state_time(&self, now: Tick) -> u64 {
        tk_to_sec(now.wrapping_sub(self.since))
    }

    /// Requests a new state, honoring `min_dwell_s` since the last
    /// accepted hardware transition.
    pub fn set_state(&mut self, turn_on: bool, min_dwell_s: u64, now: Tick) -> SetOutcome {
        if turn_on == self.is_on {
            self.requested_on = turn_on;
            return SetOutcome::Ok;
        }
        let elapsed = self.state_time(now);
        if elapsed < min_dwell_s {
            return SetOutcome::DwellRemaining(min_dwell_s - elapsed);
        }
        self.requested_on = turn_on;
        SetOutcome::Ok
    }

    /// Commits the requested state to hardware; called once per output
    /// phase. Rolls the on/off accounting and cycle count.
    pub fn update(&mut self, now: Tick) -> UpdateOutcome {
        if self.requested_on == self.is_on {
            return UpdateOutcome::None;
        }
        let elapsed = self.state_time(now);
        if self.is_on {
            self.counters.cumulated_on_s += elapsed;
        } else {
            self.counters.cumulated_off_s += elapsed;
        }
        self.is_on = self.requested_on;
        self.since = now;
        if self.is_on {
            self.counters.cycles += 1;
            UpdateOutcome::TurnedOn
        } else {
            UpdateOutcome::TurnedOff
        }
    }

    /// Merges persisted counters into this (freshly constructed) relay.
    pub fn restore(&mut self, saved: RelayCounters) {
        self.counters.cumulated_on_s += saved.cumulated_on_s;
        self.counters.cumulated_off_s += saved.cumulated_off_s;
        self.counters.cycles += saved.cycles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> Relay {
        Relay::new("burner", ResolvedId { backend: 0, id: 0 }, false, 0)
    }

    #[test]
    fn noop_when_already_in_state() {
        let mut r = relay();
        assert_eq!(r.set_state(false, 100, 0), SetOutcome::Ok);
        assert!(!r.is_on());
    }

    #[test]
    fn dwell_blocks_rapid_toggling() {
        let mut r = relay();
        assert_eq!(r.set_state(true, 240, 0), SetOutcome::Ok);
        assert_eq!(r.update(0), UpdateOutcome::TurnedOn);

        // Immediately request off: dwell not elapsed.
        match r.set_state(false, 240, 10) {
            SetOutcome::DwellRemaining(rem) => assert_eq!(rem, 230),
            SetOutcome::Ok => panic!("expected dwell rejection"),
        }
        assert!(r.is_on());

        // After the dwell elapses, the same request is accepted.
        assert_eq!(r.set_state(false, 240, 241), SetOutcome::Ok);
        assert_eq!(r.update(241), UpdateOutcome::TurnedOff);
        assert!(!r.is_on());
    }

    #[test]
    fn counters_accumulate_and_restore() {
        let mut r = relay();
        r.set_state(true, 0, 0);
        r.update(0);
        r.set_state(false, 0, 100);
        r.update(100);
        assert_eq!(r.counters().cumulated_on_s, 100);
        assert_eq!(r.counters().cycles, 1);

        let mut fresh = relay();
        fresh.restore(r.counters());
        assert_eq!(fresh.counters().cumulated_on_s, 100);
        assert_eq!(fresh.counters().cycles, 1);
    }

    #[test]
    fn state_time_matches_elapsed() {
        let r = relay();
        assert_eq!(r.state_time(50), 50);
    }
}
