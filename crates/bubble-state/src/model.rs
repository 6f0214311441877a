//! Entities, placements and relations as they arrive from collaborators.
//!
//! Field aliases accept both the snake_case column names of the backing
//! tables and the camelCase names used by the web client.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Entity identifier.
pub type EntityId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// A node in a space: a user in the network view, a content item in a
/// bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    /// Prominence, derived from content volume.
    #[serde(default, alias = "nodeCount", alias = "node_count")]
    pub weight: f64,

    /// Display label (username), carried opaquely.
    #[serde(default, alias = "username", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Bulk-load and entity-event record: an entity with its placement, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(flatten)]
    pub entity: Entity,

    #[serde(
        default,
        alias = "existing_placement",
        alias = "existingPlacement",
        skip_serializing_if = "Option::is_none"
    )]
    pub placement: Option<Placement>,
}

impl From<Entity> for EntityRecord {
    fn from(entity: Entity) -> Self {
        Self {
            entity,
            placement: None,
        }
    }
}

/// Manual position of one entity in one space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Backend row id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(alias = "node_id", alias = "nodeId", alias = "entityId")]
    pub entity_id: EntityId,

    #[serde(default, alias = "position_x")]
    pub x: f64,
    #[serde(default, alias = "position_y")]
    pub y: f64,
    #[serde(default, alias = "position_z")]
    pub z: f64,

    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Rotation about the vertical axis, radians.
    #[serde(default, alias = "rotation_y", alias = "rotationY")]
    pub rotation: f64,

    #[serde(default, alias = "displayStyle", skip_serializing_if = "Option::is_none")]
    pub display_style: Option<String>,

    /// Last-write-wins clock.
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

fn default_scale() -> f64 {
    1.0
}

impl Placement {
    pub fn new(entity_id: impl Into<EntityId>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: None,
            entity_id: entity_id.into(),
            x,
            y,
            z,
            scale: default_scale(),
            rotation: 0.0,
            display_style: None,
            updated_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Relation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Follow,
    Collaboration,
    Inspiration,
}

/// Directed, typed edge. Identity is the whole triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    #[serde(alias = "sourceId", alias = "source_id")]
    pub source: EntityId,
    #[serde(alias = "targetId", alias = "target_id")]
    pub target: EntityId,
    #[serde(rename = "type", alias = "kind")]
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>, kind: RelationKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}
