//! The actuator primitive library: relay, pump, valve.

pub mod pump;
pub mod relay;
pub mod valve;
pub mod valve_ctrl;

pub use pump::Pump;
pub use relay::Relay;
pub use valve::{Action, Valve};
pub use valve_ctrl::ValveControlAlgo;
