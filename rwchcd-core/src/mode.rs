//! Shared mode enumerations used by runtime, circuits, DHWTs and the boiler.

use serde::{Deserialize, Serialize};

/// Operating mode requested for a consumer (circuit or DHWT) or the
/// whole runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runmode {
    Off,
    Auto,
    Comfort,
    Eco,
    Frostfree,
    Dhwonly,
    Manual,
}

/// Boiler idle-mode policy applied when there is no consumer demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleMode {
    Never,
    Frostonly,
    Always,
}

/// Overall process lifecycle state, owned by the runtime singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Init,
    Online,
    Run,
    Offline,
}
