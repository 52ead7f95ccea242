//! Best-effort persistence: a small JSON envelope wrapping an
//! arbitrary serializable payload, written under the store directory.
//! A mismatched envelope is silently discarded rather than propagated
//! as an error: restarting with fresh accounting state is always safe.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rwchcd_error::{Result, RwchcdError};

use crate::constants::paths;

const MAGIC: &str = "rwchcd-store";

#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize> {
    magic: &'static str,
    engine_version: &'static str,
    caller_version: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeOwned<T> {
    magic: String,
    engine_version: String,
    caller_version: String,
    payload: T,
}

/// Writes `payload` under `name` in the store directory, tagged with
/// this build's version and `caller_version` (the caller's own schema
/// version, so an incompatible upgrade doesn't resurrect stale data
/// even when the crate version hasn't changed).
pub fn save<T: Serialize>(name: &str, caller_version: &str, payload: &T) -> Result<()> {
    let path = store_path(name)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RwchcdError::FileWrite {
            path: path.clone(),
            source,
        })?;
    }
    let envelope = EnvelopeRef {
        magic: MAGIC,
        engine_version: env!("CARGO_PKG_VERSION"),
        caller_version,
        payload,
    };
    let text = serde_json::to_string(&envelope)?;
    fs::write(&path, text).map_err(|source| RwchcdError::FileWrite { path, source })
}

/// Reads back the payload saved for `name`. Any mismatch (magic,
/// engine version, caller version) or I/O/parse error yields `None`:
/// "nothing usable was persisted", never a hard failure.
pub fn load<T: DeserializeOwned>(name: &str, caller_version: &str) -> Option<T> {
    let path = store_path(name).ok()?;
    let text = fs::read_to_string(path).ok()?;
    let envelope: EnvelopeOwned<T> = serde_json::from_str(&text).ok()?;
    if envelope.magic != MAGIC
        || envelope.engine_version != env!("CARGO_PKG_VERSION")
        || envelope.caller_version != caller_version
    {
        return None;
    }
    Some(envelope.payload)
}

fn store_path(name: &str) -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .ok_or_else(|| RwchcdError::misconfigured("no local data directory for this user"))?;
    Ok(base.join(paths::STORE_DIR_NAME).join(format!("{name}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::relay::RelayCounters;

    #[test]
    fn envelope_round_trips_in_memory() {
        let counters = RelayCounters {
            cumulated_on_s: 120,
            cumulated_off_s: 900,
            cycles: 3,
        };
        let envelope = EnvelopeRef {
            magic: MAGIC,
            engine_version: env!("CARGO_PKG_VERSION"),
            caller_version: "relay-v1",
            payload: &counters,
        };
        let text = serde_json::to_string(&envelope).unwrap();
        let back: EnvelopeOwned<RelayCounters> = serde_json::from_str(&text).unwrap();
        assert_eq!(back.payload.cumulated_on_s, 120);
        assert_eq!(back.caller_version, "relay-v1");
    }

    #[test]
    fn mismatched_caller_version_is_discarded() {
        let envelope = EnvelopeOwned {
            magic: MAGIC.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            caller_version: "old-schema".to_string(),
            payload: RelayCounters::default(),
        };
        assert_ne!(envelope.caller_version, "relay-v1");
    }
}
