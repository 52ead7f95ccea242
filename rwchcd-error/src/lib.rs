//! Unified error taxonomy for rwchcd.
//!
//! One error type is shared by every layer of the control engine, from
//! config validation down to the master loop. Variants group into the
//! kinds named by the engine's error design: configuration, lifecycle,
//! runtime arithmetic/logic, sensor, hardware, and resource errors.

use std::io;
use std::path::PathBuf;

/// Result type alias using [`RwchcdError`].
pub type Result<T> = std::result::Result<T, RwchcdError>;

/// Unified error type for all rwchcd operations.
#[derive(thiserror::Error, Debug)]
pub enum RwchcdError {
    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("unknown identifier: {0}")]
    Unknown(String),

    #[error("already exists: {0}")]
    Exists(String),

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------
    #[error("element is offline: {0}")]
    Offline(String),

    #[error("initialization failed: {0}")]
    Init(String),

    /// Non-fatal: caller should silently skip this element this iteration.
    #[error("ignored: {0}")]
    Ignore(String),

    // ------------------------------------------------------------------
    // Runtime arithmetic / logic
    // ------------------------------------------------------------------
    #[error("invalid runmode for this operation")]
    InvalidMode,

    #[error("value inside dead zone")]
    Deadzone,

    #[error("value inside dead band")]
    Deadband,

    #[error("{0}")]
    Generic(String),

    // ------------------------------------------------------------------
    // Sensor
    // ------------------------------------------------------------------
    #[error("sensor value invalid: {0}")]
    SensorInval(String),

    #[error("sensor short-circuit: {0}")]
    SensorShort(String),

    #[error("sensor disconnected: {0}")]
    SensorDiscon(String),

    // ------------------------------------------------------------------
    // Hardware
    // ------------------------------------------------------------------
    #[error("hardware error: {0}")]
    Hardware(String),

    #[error("safety shutdown: {0}")]
    Safety(String),

    #[error("mismatch: {0}")]
    Mismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------
    #[error("out of memory")]
    OutOfMemory,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    FileWrite { path: PathBuf, source: io::Error },

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("persistent store error: {0}")]
    Store(String),
}

impl RwchcdError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True if this error represents a sensor fault (one of the three sensor kinds).
    pub fn is_sensor_fault(&self) -> bool {
        matches!(
            self,
            Self::SensorInval(_) | Self::SensorShort(_) | Self::SensorDiscon(_)
        )
    }
}

impl From<String> for RwchcdError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for RwchcdError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
