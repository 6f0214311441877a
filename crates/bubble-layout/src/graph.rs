//! Simulation input and output types.

use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::Dimensions;

/// Entity identifier, shared with the state layer as a plain string.
pub type EntityId = String;

/// An entity handed to the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: EntityId,
    /// Prominence weight (e.g. content count); drives collision radius.
    pub weight: f64,
    /// Starting position. `None` is randomized around the origin.
    pub position: Option<DVec3>,
    /// Pinned entities keep their position and are never moved by forces.
    pub pinned: bool,
}

impl LayoutNode {
    pub fn new(id: impl Into<EntityId>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            position: None,
            pinned: false,
        }
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn pinned_at(mut self, position: DVec3) -> Self {
        self.position = Some(position);
        self.pinned = true;
        self
    }
}

/// An attraction hint between two entities.
///
/// Relation kinds (follow, collaboration, inspiration) are laid out
/// uniformly; a link may still override the spring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: EntityId,
    pub target: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

impl Link {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            distance: None,
            strength: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }
}

/// Position of one entity in a tick frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Position {
    pub fn from_vec(v: DVec3, dimensions: Dimensions) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: dimensions.is_3d().then_some(v.z),
        }
    }

    pub fn to_vec(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z.unwrap_or(0.0))
    }

    pub fn distance(&self, other: &Self) -> f64 {
        self.to_vec().distance(other.to_vec())
    }
}

/// Everything the render layer needs after one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TickFrame {
    /// Ticks elapsed since the last (re)start.
    pub tick: u64,
    pub alpha: f64,
    pub positions: HashMap<EntityId, Position>,
    /// True on the last frame; no further frames follow until a restart.
    pub settled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_omits_z_in_2d() {
        let p = Position::from_vec(DVec3::new(1.0, 2.0, 3.0), Dimensions::Two);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0}"#);
    }

    #[test]
    fn position_keeps_z_in_3d() {
        let p = Position::from_vec(DVec3::new(1.0, 2.0, 3.0), Dimensions::Three);
        assert_eq!(p.z, Some(3.0));
        assert_eq!(p.to_vec(), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn frame_serialization() {
        let mut frame = TickFrame {
            tick: 4,
            alpha: 0.5,
            ..TickFrame::default()
        };
        frame.positions.insert("a".into(), Position { x: 1.0, y: 0.0, z: None });

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: TickFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, frame);
    }
}
