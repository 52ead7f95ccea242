//! Plant-wide, hot-path read-only data shared by every consumer.
//!
//! Rather than threading cyclic references between the plant, its
//! heat source, and each consumer, the heat source publishes one
//! snapshot per iteration; circuits and DHWTs take it by reference.

/// Snapshot of plant-wide state, refreshed once per [`crate::plant::Plant::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlantData {
    /// True when the (single) heat source judges it could go idle.
    pub could_sleep: bool,
    /// Signed percentage shift broadcast by the heat source; negative
    /// pulls demand down, positive pulls it up.
    pub consumer_shift: i32,
    /// Seconds a consumer must keep drawing after the source stops
    /// requesting, to absorb residual energy.
    pub consumer_stop_delay_s: u64,
    pub summer: bool,
    pub summer_maintenance: bool,
}
