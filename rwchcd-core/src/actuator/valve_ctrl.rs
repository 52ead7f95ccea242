//! Valve control laws.
//!
//! Three closed, tagged variants rather than a trait object: the set of
//! laws is small and fixed, each carries its own tuning parameters and
//! running state, and the variant is chosen once at configuration time.

use crate::temp::{delta_to_kelvin, Temp};
use crate::timekeep::{tk_to_sec, Tick};

use super::valve::{Action, Valve};

/// A pluggable strategy turning `(target_output_temp, output_temp)` into
/// a course demand on a [`Valve`].
#[derive(Debug, Clone)]
pub enum ValveControlAlgo {
    /// Full open/close on either side of the dead-zone.
    BangBang,

    /// Fixed-size steps, evaluated once per `sample_interval_s`.
    SuccessiveApprox {
        sample_interval_s: u64,
        amount_pct: f64,
        last_sample: Tick,
    },

    /// Velocity-form PI on the output temperature.
    Pi {
        sample_interval_s: u64,
        tempin_low: Temp,
        tempin_high: Temp,
        /// Ziegler-Nichols-style tuning factor; 10 is "moderate".
        tuning_factor: f64,
        last_sample: Tick,
        prev_output: Temp,
        reset: bool,
        deadband_accum: f64,
    },
}

impl ValveControlAlgo {
    pub fn bang_bang() -> Self {
        Self::BangBang
    }

    pub fn successive_approx(sample_interval_s: u64, amount_pct: f64) -> Self {
        Self::SuccessiveApprox {
            sample_interval_s,
            amount_pct,
            last_sample: 0,
        }
    }

    pub fn pi(
        sample_interval_s: u64,
        tempin_low: Temp,
        tempin_high: Temp,
        tuning_factor: f64,
    ) -> Self {
        Self::Pi {
            sample_interval_s,
            tempin_low,
            tempin_high,
            tuning_factor,
            last_sample: 0,
            prev_output: 0,
            reset: true,
            deadband_accum: 0.0,
        }
    }

    /// Runs one control-law evaluation, issuing a course request on
    /// `valve` as needed. No-op outside each law's own sampling cadence.
    pub fn update(&mut self, valve: &mut Valve, target_output_temp: Temp, output_temp: Temp, now: Tick) {
        match self {
            ValveControlAlgo::BangBang => {
                let err = target_output_temp - output_temp;
                if err.abs() <= valve.dead_zone {
                    valve.request_stop();
                } else if err > 0 {
                    valve.request_full_open();
                } else {
                    valve.request_full_close();
                }
            }

            ValveControlAlgo::SuccessiveApprox {
                sample_interval_s,
                amount_pct,
                last_sample,
            } => {
                if tk_to_sec(now.wrapping_sub(*last_sample)) < *sample_interval_s {
                    return;
                }
                *last_sample = now;
                let err = target_output_temp - output_temp;
                if err.abs() > valve.dead_zone / 2 {
                    if err > 0 {
                        valve.request_course(Action::Open, *amount_pct);
                    } else {
                        valve.request_course(Action::Close, *amount_pct);
                    }
                } else {
                    valve.request_stop();
                }
            }

            ValveControlAlgo::Pi {
                sample_interval_s,
                tempin_low,
                tempin_high,
                tuning_factor,
                last_sample,
                prev_output,
                reset,
                deadband_accum,
            } => {
                if tk_to_sec(now.wrapping_sub(*last_sample)) < *sample_interval_s {
                    return;
                }
                let dt_s = tk_to_sec(now.wrapping_sub(*last_sample)).max(1) as f64;
                *last_sample = now;

                if target_output_temp <= *tempin_low {
                    valve.request_full_close();
                    *reset = true;
                    return;
                }
                if target_output_temp >= *tempin_high {
                    valve.request_full_open();
                    *reset = true;
                    return;
                }
                if (target_output_temp - output_temp).abs() < valve.dead_zone / 2 {
                    *reset = true;
                    return;
                }

                if *reset {
                    *prev_output = output_temp;
                    *deadband_accum = 0.0;
                    *reset = false;
                }

                let k = delta_to_kelvin((*tempin_high - *tempin_low).abs());
                let tu = valve.ete_time_s as f64;
                let td = *sample_interval_s as f64;
                let tc = *tuning_factor * tu.max(8.0 * td) / 10.0;
                let kp_u = tu / (td + tc);
                let kp = kp_u / k;
                let ki = kp / tu;

                let iterm = ki * delta_to_kelvin(target_output_temp - output_temp) * dt_s;
                let pterm = kp * delta_to_kelvin(*prev_output - output_temp);
                let total_iterm = *deadband_accum + iterm;
                let requested_pct = total_iterm + pterm;

                if requested_pct.abs() < valve.dead_band_pct {
                    *deadband_accum = total_iterm;
                } else {
                    *prev_output = output_temp;
                    *deadband_accum = 0.0;
                    let amount = requested_pct.round();
                    if amount > 0.0 {
                        valve.request_course(Action::Open, amount);
                    } else {
                        valve.request_course(Action::Close, -amount);
                    }
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

    fn valve() -> Valve {
        let mut v = Valve::new(
            "v",
            ResolvedId { backend: 0, id: 0 },
            ResolvedId { backend: 0, id: 1 },
            120,
            5.0,
            crate::temp::kelvin_to_delta(0.3),
            0,
        );
        v.online(0);
        v.tick(0.0, 0);
        v
    }

    #[test]
    fn bang_bang_opens_when_below_target() {
        let mut v = valve();
        let mut algo = ValveControlAlgo::bang_bang();
        algo.update(&mut v, celsius_to_temp(60.0), celsius_to_temp(40.0), 1);
        v.logic();
        v.tick(1.0, 1);
        assert_eq!(v.actual_action(), Action::Open);
    }

    #[test]
    fn bang_bang_stops_inside_dead_zone() {
        let mut v = valve();
        let mut algo = ValveControlAlgo::bang_bang();
        algo.update(&mut v, celsius_to_temp(50.0), celsius_to_temp(50.0), 1);
        // Requested action collapses to Stop inside the dead zone.
        v.logic();
        assert_eq!(v.actual_action(), Action::Stop);
    }

    #[test]
    fn successive_approx_waits_for_sample_interval() {
        let mut v = valve();
        let mut algo = ValveControlAlgo::successive_approx(30, 5.0);
        algo.update(&mut v, celsius_to_temp(60.0), celsius_to_temp(40.0), 5);
        // Too soon after construction (last_sample starts at 0, interval 30s).
        if let ValveControlAlgo::SuccessiveApprox { last_sample, .. } = &algo {
            assert_eq!(*last_sample, 0);
        }
    }
}
