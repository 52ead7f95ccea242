//! Outdoor-temperature processing for one building.
//!
//! Two cascaded exponentially-weighted moving averages turn a raw
//! outdoor sample into a "mixed" value (the building's fast thermal
//! response) and an "attenuated" value (its slow response), used by
//! every circuit's water-curve and by the summer switchover.

use crate::temp::Temp;
use rwchcd_error::Result;

/// `ewma(prev, new, tau, dt) := prev - alpha*(prev - new)`, `alpha := dt/(tau+dt)`.
fn ewma(prev: f64, new: f64, tau_s: f64, dt_s: f64) -> f64 {
    let alpha = dt_s / (tau_s + dt_s);
    prev - alpha * (prev - new)
}

/// Per-building outdoor-temperature model.
pub struct Building {
    pub name: String,
    /// Building thermal time constant, seconds.
    pub tau_s: f64,
    /// Summer-switchover threshold.
    pub limit_tsummer: Temp,

    t_outdoor: Temp,
    t_outdoor_mixed: Temp,
    t_outdoor_attenuated: Temp,
    seeded: bool,
    pub summer: bool,
}

impl Building {
    pub fn new(name: impl Into<String>, tau_s: f64, limit_tsummer: Temp) -> Self {
        Self {
            name: name.into(),
            tau_s,
            limit_tsummer,
            t_outdoor: 0,
            t_outdoor_mixed: 0,
            t_outdoor_attenuated: 0,
            seeded: false,
            summer: false,
        }
    }

    pub fn t_outdoor(&self) -> Temp {
        self.t_outdoor
    }

    pub fn t_outdoor_mixed(&self) -> Temp {
        self.t_outdoor_mixed
    }

    pub fn t_outdoor_attenuated(&self) -> Temp {
        self.t_outdoor_attenuated
    }

    /// Runs one iteration. `sample` is the outdoor sensor's (possibly
    /// faulty) reading; faults leave the model untouched, consistent
    /// with a circuit keeping its last known water target.
    pub fn update(&mut self, sample: Result<Temp>, dt_s: f64) {
        let Ok(sample) = sample else { return };

        if !self.seeded {
            self.t_outdoor = sample;
            self.t_outdoor_mixed = sample;
            self.t_outdoor_attenuated = sample;
            self.seeded = true;
        } else {
            self.t_outdoor = sample;
            let mixed = ewma(self.t_outdoor_mixed as f64, sample as f64, self.tau_s, dt_s);
            let attenuated = ewma(
                self.t_outdoor_attenuated as f64,
                mixed,
                self.tau_s,
                dt_s,
            );
            self.t_outdoor_mixed = mixed.round() as Temp;
            self.t_outdoor_attenuated = attenuated.round() as Temp;
        }

        self.update_summer_flag();
    }

    fn update_summer_flag(&mut self) {
        let all_above = self.t_outdoor > self.limit_tsummer
            && self.t_outdoor_mixed > self.limit_tsummer
            && self.t_outdoor_attenuated > self.limit_tsummer;
        let all_below = self.t_outdoor < self.limit_tsummer
            && self.t_outdoor_mixed < self.limit_tsummer
            && self.t_outdoor_attenuated < self.limit_tsummer;

        if !self.summer && all_above {
            self.summer = true;
        } else if self.summer && all_below {
            self.summer = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temp::celsius_to_temp;

    #[test]
    fn seed_on_first_sample() {
        let mut b = Building::new("b", 36000.0, celsius_to_temp(18.0));
        b.update(Ok(celsius_to_temp(5.0)), 1.0);
        assert!((b.t_outdoor_mixed() - b.t_outdoor_attenuated()).abs() <= 1);
        // One further tick with the same sample should stay within 0.01K.
        b.update(Ok(celsius_to_temp(5.0)), 1.0);
        let c = crate::temp::temp_to_celsius(b.t_outdoor_mixed());
        assert!((c - 5.0).abs() < 0.01);
        let c2 = crate::temp::temp_to_celsius(b.t_outdoor_attenuated());
        assert!((c2 - 5.0).abs() < 0.01);
    }

    #[test]
    fn mixed_is_at_least_as_responsive_as_attenuated() {
        let mut b = Building::new("b", 36000.0, celsius_to_temp(18.0));
        b.update(Ok(celsius_to_temp(5.0)), 1.0);
        // Step change: outdoor jumps to 15C.
        b.update(Ok(celsius_to_temp(15.0)), 600.0);
        let d_mixed = (b.t_outdoor_mixed() - celsius_to_temp(15.0)).abs();
        let d_att = (b.t_outdoor_attenuated() - celsius_to_temp(15.0)).abs();
        assert!(d_mixed <= d_att);
    }

    #[test]
    fn fault_leaves_model_untouched() {
        let mut b = Building::new("b", 36000.0, celsius_to_temp(18.0));
        b.update(Ok(celsius_to_temp(5.0)), 1.0);
        let before = b.t_outdoor_mixed();
        b.update(Err(rwchcd_error::RwchcdError::SensorShort("x".into())), 1.0);
        assert_eq!(b.t_outdoor_mixed(), before);
    }

    #[test]
    fn summer_flag_asymmetric() {
        let mut b = Building::new("b", 1.0, celsius_to_temp(18.0));
        for _ in 0..10 {
            b.update(Ok(celsius_to_temp(25.0)), 3600.0);
        }
        assert!(b.summer);
        // A single reading dipping below doesn't flip it back unless all three fall below.
        b.update(Ok(celsius_to_temp(10.0)), 1.0);
        assert!(b.summer);
    }
}
