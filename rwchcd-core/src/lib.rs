//! Core control engine for the rwchcd weather-compensated heating
//! controller: hardware abstraction, the actuator and sensor
//! primitives, the circuit/DHWT/heat-source control laws, and the
//! plant/runtime orchestration layer on top of them.

pub mod actuator;
pub mod alarms;
pub mod backend;
pub mod circuit;
pub mod config;
pub mod constants;
pub mod dhwt;
pub mod heatsource;
pub mod mode;
pub mod outdoor;
pub mod persistence;
pub mod plant;
pub mod plant_data;
pub mod runtime;
pub mod sensor;
pub mod temp;
pub mod timekeep;

pub use rwchcd_error::{Result, RwchcdError};
