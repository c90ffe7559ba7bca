use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use replica::{LinkConditions, PlanarMovement, PredictionConfig, ReplicationConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub clients: u32,
    pub crates: u32,
    pub duration_secs: f32,
    pub replication: ReplicationConfig,
    pub prediction: PredictionConfig,
    pub link: LinkConditions,
    pub movement: PlanarMovement,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            crates: 8,
            duration_secs: 10.0,
            replication: ReplicationConfig::default(),
            prediction: PredictionConfig::default(),
            link: LinkConditions::default(),
            movement: PlanarMovement::default(),
        }
    }
}

impl SandboxConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
