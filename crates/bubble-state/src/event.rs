//! Remote change events.
//!
//! On the wire an event is
//!
//! ```json
//! { "kind": "insert", "target": "placement", "payload": { ... } }
//! ```
//!
//! and is validated into a [`RemoteEvent`] before it reaches the reconciler.
//! Delivery is at-least-once and unordered, so every event must be safe to
//! apply twice.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Entity, EntityId, EntityRecord, Placement, Relation};

/// Change kind on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

/// Collection a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTarget {
    Entity,
    Placement,
    Relation,
}

/// Raw event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub kind: EventKind,
    pub target: EventTarget,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    /// New entity, possibly with its placement.
    Insert(EntityRecord),
    /// Content change; the placement is left alone.
    Update(Entity),
    Delete { id: EntityId },
}

/// Placement change. Inserts may carry the full entity so a placement for an
/// entity this client has not seen yet can still be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementEvent {
    Insert { placement: Placement, entity: Option<Entity> },
    Update { placement: Placement, entity: Option<Entity> },
    Delete(PlacementRef),
}

/// Identifies a placement to delete, by owning entity or by row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        default,
        alias = "node_id",
        alias = "nodeId",
        alias = "entityId",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationEvent {
    Insert(Relation),
    Update(Relation),
    Delete(Relation),
}

/// A validated remote event.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Entity(EntityEvent),
    Placement(PlacementEvent),
    Relation(RelationEvent),
}

#[derive(Deserialize)]
struct EntityRef {
    id: EntityId,
}

#[derive(Serialize, Deserialize)]
struct PlacementPayload {
    #[serde(flatten)]
    placement: Placement,
    #[serde(default, alias = "node", skip_serializing_if = "Option::is_none")]
    entity: Option<Entity>,
}

fn parse<T: serde::de::DeserializeOwned>(wire: &WireEvent) -> Result<T> {
    serde_json::from_value(wire.payload.clone()).map_err(|e| {
        Error::MalformedEvent(format!(
            "{:?} {:?} payload: {e}",
            wire.kind, wire.target
        ))
    })
}

impl TryFrom<WireEvent> for RemoteEvent {
    type Error = Error;

    fn try_from(wire: WireEvent) -> Result<Self> {
        use EventKind::*;

        let event = match wire.target {
            EventTarget::Entity => RemoteEvent::Entity(match wire.kind {
                Insert => EntityEvent::Insert(parse(&wire)?),
                Update => EntityEvent::Update(parse(&wire)?),
                Delete => EntityEvent::Delete {
                    id: parse::<EntityRef>(&wire)?.id,
                },
            }),
            EventTarget::Placement => RemoteEvent::Placement(match wire.kind {
                Insert => {
                    let PlacementPayload { placement, entity } = parse(&wire)?;
                    PlacementEvent::Insert { placement, entity }
                }
                Update => {
                    let PlacementPayload { placement, entity } = parse(&wire)?;
                    PlacementEvent::Update { placement, entity }
                }
                Delete => {
                    let key: PlacementRef = parse(&wire)?;
                    if key.id.is_none() && key.entity_id.is_none() {
                        return Err(Error::MalformedEvent(
                            "placement delete needs an id or entity_id".into(),
                        ));
                    }
                    PlacementEvent::Delete(key)
                }
            }),
            EventTarget::Relation => RemoteEvent::Relation(match wire.kind {
                Insert => RelationEvent::Insert(parse(&wire)?),
                Update => RelationEvent::Update(parse(&wire)?),
                Delete => RelationEvent::Delete(parse(&wire)?),
            }),
        };
        Ok(event)
    }
}

impl RemoteEvent {
    /// Validate a JSON value from the pub/sub channel.
    pub fn from_value(value: Value) -> Result<Self> {
        let wire: WireEvent = serde_json::from_value(value)
            .map_err(|e| Error::MalformedEvent(format!("envelope: {e}")))?;
        wire.try_into()
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RemoteEvent::Entity(EntityEvent::Insert(_))
            | RemoteEvent::Placement(PlacementEvent::Insert { .. })
            | RemoteEvent::Relation(RelationEvent::Insert(_)) => EventKind::Insert,
            RemoteEvent::Entity(EntityEvent::Update(_))
            | RemoteEvent::Placement(PlacementEvent::Update { .. })
            | RemoteEvent::Relation(RelationEvent::Update(_)) => EventKind::Update,
            _ => EventKind::Delete,
        }
    }

    pub fn target(&self) -> EventTarget {
        match self {
            RemoteEvent::Entity(_) => EventTarget::Entity,
            RemoteEvent::Placement(_) => EventTarget::Placement,
            RemoteEvent::Relation(_) => EventTarget::Relation,
        }
    }

    /// Entity ids this event reads or writes.
    pub fn entity_ids(&self) -> Vec<&str> {
        match self {
            RemoteEvent::Entity(EntityEvent::Insert(r)) => vec![r.entity.id.as_str()],
            RemoteEvent::Entity(EntityEvent::Update(e)) => vec![e.id.as_str()],
            RemoteEvent::Entity(EntityEvent::Delete { id }) => vec![id.as_str()],
            RemoteEvent::Placement(PlacementEvent::Insert { placement, .. })
            | RemoteEvent::Placement(PlacementEvent::Update { placement, .. }) => {
                vec![placement.entity_id.as_str()]
            }
            RemoteEvent::Placement(PlacementEvent::Delete(key)) => {
                key.entity_id.as_deref().into_iter().collect()
            }
            RemoteEvent::Relation(
                RelationEvent::Insert(r) | RelationEvent::Update(r) | RelationEvent::Delete(r),
            ) => vec![r.source.as_str(), r.target.as_str()],
        }
    }

    /// Encode back to the wire shape.
    pub fn to_wire(&self) -> Result<WireEvent> {
        let payload = match self {
            RemoteEvent::Entity(EntityEvent::Insert(record)) => serde_json::to_value(record)?,
            RemoteEvent::Entity(EntityEvent::Update(entity)) => serde_json::to_value(entity)?,
            RemoteEvent::Entity(EntityEvent::Delete { id }) => serde_json::json!({ "id": id }),
            RemoteEvent::Placement(
                PlacementEvent::Insert { placement, entity } | PlacementEvent::Update { placement, entity },
            ) => serde_json::to_value(PlacementPayload {
                placement: placement.clone(),
                entity: entity.clone(),
            })?,
            RemoteEvent::Placement(PlacementEvent::Delete(key)) => serde_json::to_value(key)?,
            RemoteEvent::Relation(
                RelationEvent::Insert(r) | RelationEvent::Update(r) | RelationEvent::Delete(r),
            ) => serde_json::to_value(r)?,
        };
        Ok(WireEvent {
            kind: self.kind(),
            target: self.target(),
            payload,
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_wire()?)?)
    }
}
