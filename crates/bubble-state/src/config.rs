use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reconciler limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Remote events buffered between drains. Overflow requests a resync.
    pub inbox_capacity: usize,
    /// Failed dispatches kept for retry; the oldest are dropped beyond this.
    pub max_failed: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
            max_failed: 256,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inbox_capacity == 0 {
            return Err(Error::InvalidConfig("inbox_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
