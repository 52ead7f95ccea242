//! Shared constants for the control engine.
//!
//! Centralizes magic numbers so they are defined once: timekeep
//! resolution, temperature sentinels, and default filesystem locations.

/// Timekeep resolution: ticks per second.
pub const TK_PER_SEC: i64 = 10;

/// Master loop watchdog period, in seconds, overridable via `RWCHCD_WDOGTM`.
pub const WDOG_DEFAULT_TIMEOUT_S: u64 = 60;

/// Alarm throttle: minimum interval between notifier runs.
pub const ALARM_THROTTLE_S: u64 = 60;

/// Summer maintenance: how often the override runs.
pub const SUMMER_RUN_INTVL_S: u64 = 7 * 24 * 3600;

/// Summer maintenance: how long the override stays asserted.
pub const SUMMER_RUN_DURATION_S: u64 = 5 * 60;

/// Circuit rate-of-rise update period.
pub const ROR_UPDATE_INTERVAL_S: u64 = 60;

/// Circuit rate-of-rise moving-average time constant.
pub const ROR_TIME_CONSTANT_S: f64 = 3600.0;

pub mod paths {
    /// Default configuration file path.
    pub const DEFAULT_CONFIG_FILE: &str = "/etc/rwchcd.conf";

    /// Advisory single-instance lock file.
    pub const LOCK_FILE: &str = "/run/rwchcd.lock";

    /// Config directory name under the resolved XDG config root, used by
    /// the serde-based config mirror (`crate::config`).
    pub const CONFIG_DIR_NAME: &str = "rwchcd";

    /// Default JSON config mirror filename.
    pub const PLANT_CONFIG_FILE: &str = "plant.json";

    /// Default persisted-object storage root.
    pub const STORE_DIR_NAME: &str = "rwchcd";
}

pub mod env {
    /// Overrides the watchdog timeout, in seconds.
    pub const WDOG_TIMEOUT: &str = "RWCHCD_WDOGTM";

    /// Controls `tracing_subscriber::EnvFilter` directives.
    pub const LOG_FILTER: &str = "RWCHCD_LOG";
}
