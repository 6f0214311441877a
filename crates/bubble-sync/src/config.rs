use bubble_layout::{LayerConfig, SimulationConfig};
use bubble_state::ReconcilerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Everything a [`SpaceSession`](crate::SpaceSession) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub simulation: SimulationConfig,
    pub layers: LayerConfig,
    pub reconciler: ReconcilerConfig,
    pub feed: FeedConfig,
    /// Ring radius for idle-layer entities.
    pub idle_radius: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            layers: LayerConfig::default(),
            reconciler: ReconcilerConfig::default(),
            feed: FeedConfig::default(),
            idle_radius: 300.0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        self.simulation.forces.validate()?;
        self.layers.validate()?;
        self.reconciler.validate()?;
        if self.feed.capacity == 0 {
            return Err(Error::InvalidConfig("feed capacity must be at least 1".into()));
        }
        if !self.idle_radius.is_finite() || self.idle_radius < 0.0 {
            return Err(Error::InvalidConfig(format!("idle_radius {}", self.idle_radius)));
        }
        Ok(())
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_layers(mut self, layers: LayerConfig) -> Self {
        self.layers = layers;
        self
    }
}

/// Remote feed channel sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Bound of the pub/sub channel. Publishers wait when it is full.
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}
