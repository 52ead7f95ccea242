//! Pump: one relay plus a configurable off-cooldown.

use crate::backend::ResolvedId;
use crate::timekeep::Tick;

use super::relay::{Relay, SetOutcome, UpdateOutcome};

/// A circulation pump.
pub struct Pump {
    pub name: String,
    pub configured: bool,
    pub online: bool,
    pub cooldown_s: u64,
    relay: Relay,
}

impl Pump {
    pub fn new(name: impl Into<String>, backend: ResolvedId, cooldown_s: u64, now: Tick) -> Self {
        Self {
            name: name.into(),
            configured: true,
            online: false,
            cooldown_s,
            relay: Relay::new("pump", backend, false, now),
        }
    }

    pub fn is_on(&self) -> bool {
        self.relay.is_on()
    }

    /// The underlying relay, for the output phase to read its backend
    /// id and committed state.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Merges persisted counters into the internal relay, before onlining.
    pub fn restore_counters(&mut self, saved: super::relay::RelayCounters) {
        self.relay.restore(saved);
    }

    /// Requests a new pump state. A non-forced "off" resumes any
    /// remaining off-cooldown; forced transitions ignore dwell in
    /// either direction.
    pub fn request(&mut self, turn_on: bool, force: bool, now: Tick) -> SetOutcome {
        if turn_on {
            // Force-on ignores on-dwell; non-forced on has none to begin with.
            self.relay.set_state(true, 0, now)
        } else if force {
            self.relay.set_state(false, 0, now)
        } else {
            self.relay.set_state(false, self.cooldown_s, now)
        }
    }

    /// Commits the requested state to hardware; called once per output phase.
    pub fn run(&mut self, now: Tick) -> UpdateOutcome {
        self.relay.update(now)
    }

    /// Onlines the pump (non-forced).
    pub fn set_online(&mut self, online: bool, now: Tick) {
        if !online {
            self.request(false, true, now);
            self.run(now);
        }
        self.online = online;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pump() -> Pump {
        Pump::new("p1", ResolvedId { backend: 0, id: 0 }, 30, 0)
    }

    #[test]
    fn cooldown_delays_non_forced_off() {
        let mut p = pump();
        p.request(true, false, 0);
        p.run(0);
        assert!(p.is_on());

        match p.request(false, false, 10) {
            SetOutcome::DwellRemaining(rem) => assert_eq!(rem, 20),
            SetOutcome::Ok => panic!("expected cooldown"),
        }
        assert!(p.is_on());
    }

    #[test]
    fn forced_off_ignores_cooldown() {
        let mut p = pump();
        p.request(true, false, 0);
        p.run(0);
        assert_eq!(p.request(false, true, 1), SetOutcome::Ok);
        p.run(1);
        assert!(!p.is_on());
    }

    #[test]
    fn offline_forces_off() {
        let mut p = pump();
        p.request(true, false, 0);
        p.run(0);
        p.set_online(false, 1);
        assert!(!p.is_on());
    }
}
