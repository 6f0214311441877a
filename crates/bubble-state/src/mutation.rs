//! Local optimistic mutations and the dispatch records they produce.

use serde::{Deserialize, Serialize};

use crate::model::{Entity, EntityId, Placement, Relation};

/// An edit made by the local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalMutation {
    CreateEntity {
        entity: Entity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placement: Option<Placement>,
    },
    /// Final placement, persisted.
    UpdatePlacement { placement: Placement },
    /// In-progress drag. Applied and guarded like a placement update but
    /// never dispatched; the drop sends an `UpdatePlacement`.
    DragPlacement { placement: Placement },
    DeleteEntity { id: EntityId },
    AddRelation { relation: Relation },
    RemoveRelation { relation: Relation },
}

impl LocalMutation {
    /// Whether the mutation has a server-side counterpart.
    pub fn is_durable(&self) -> bool {
        !matches!(self, LocalMutation::DragPlacement { .. })
    }
}

/// Outbox sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatchId(pub u64);

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A mutation handed to the persistence collaborator, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: DispatchId,
    pub mutation: LocalMutation,
}

/// A dispatch the collaborator reported as failed.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub dispatch: Dispatch,
    pub reason: String,
}

/// Result of a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// State changed.
    pub changed: bool,
    /// Outbox entry, if the mutation was queued for persistence.
    pub dispatch: Option<DispatchId>,
}

impl Applied {
    pub(crate) const UNCHANGED: Self = Self {
        changed: false,
        dispatch: None,
    };
}
