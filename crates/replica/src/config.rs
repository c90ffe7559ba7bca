use serde::{Deserialize, Serialize};

use crate::net::MAX_ENTITIES_PER_SNAPSHOT;
use crate::sync::DEFAULT_SNAPSHOT_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub tick_rate: u32,
    /// Snapshots per second, independent of `tick_rate`.
    pub send_rate: u32,
    /// Length of the server's world-state ring and of each field's history.
    pub snapshot_capacity: usize,
    pub command_capacity: usize,
    pub max_entities_per_message: usize,
    /// How far behind the newest snapshot a client renders interpolated fields.
    pub interpolation_delay: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            send_rate: 20,
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            command_capacity: 128,
            max_entities_per_message: MAX_ENTITIES_PER_SNAPSHOT,
            interpolation_delay: 0.1,
        }
    }
}

impl ReplicationConfig {
    pub fn entities_per_message(&self) -> usize {
        self.max_entities_per_message
            .clamp(1, MAX_ENTITIES_PER_SNAPSHOT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub command_capacity: usize,
    /// Rate at which the visual correction offset decays, per second.
    pub error_correction_speed: f32,
    /// Corrections larger than this are applied without smoothing.
    pub snap_threshold: f32,
    /// Corrections smaller than this are ignored entirely.
    pub error_threshold: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            command_capacity: 128,
            error_correction_speed: 20.0,
            snap_threshold: 4.0,
            error_threshold: 0.001,
        }
    }
}
