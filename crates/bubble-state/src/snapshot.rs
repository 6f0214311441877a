//! Immutable view of a space.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{Entity, EntityId, Placement, Relation};

/// Entities, placements and relations of one space.
///
/// The reconciler hands these out behind an `Arc`; a snapshot that has been
/// read never changes. Equality ignores entity insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpaceSnapshot {
    entities: IndexMap<EntityId, Entity>,
    /// Keyed by entity id; at most one placement per entity.
    placements: BTreeMap<EntityId, Placement>,
    relations: BTreeSet<Relation>,
}

impl SpaceSnapshot {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn placement(&self, entity_id: &str) -> Option<&Placement> {
        self.placements.get(entity_id)
    }

    /// Look a placement up by its backend row id.
    pub fn placement_by_id(&self, placement_id: &str) -> Option<&Placement> {
        self.placements
            .values()
            .find(|p| p.id.as_deref() == Some(placement_id))
    }

    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.placements.values()
    }

    /// Entities with no manual placement, in insertion order. These are the
    /// ones left to automatic layout.
    pub fn unplaced(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(|e| !self.placements.contains_key(&e.id))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn has_relation(&self, relation: &Relation) -> bool {
        self.relations.contains(relation)
    }

    /// Relations with `id` at either end.
    pub fn relations_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations.iter().filter(move |r| r.touches(id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub(crate) fn insert_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Replace entity fields in place, keeping its position in the order.
    pub(crate) fn replace_entity(&mut self, entity: Entity) -> bool {
        match self.entities.get_mut(&entity.id) {
            Some(slot) => {
                *slot = entity;
                true
            }
            None => false,
        }
    }

    /// Remove an entity with its placement and every relation touching it.
    pub(crate) fn remove_entity(&mut self, id: &str) -> bool {
        if self.entities.shift_remove(id).is_none() {
            return false;
        }
        self.placements.remove(id);
        self.relations.retain(|r| !r.touches(id));
        true
    }

    pub(crate) fn set_placement(&mut self, placement: Placement) {
        debug_assert!(self.entities.contains_key(&placement.entity_id));
        self.placements.insert(placement.entity_id.clone(), placement);
    }

    pub(crate) fn remove_placement(&mut self, entity_id: &str) -> Option<Placement> {
        self.placements.remove(entity_id)
    }

    pub(crate) fn insert_relation(&mut self, relation: Relation) -> bool {
        self.relations.insert(relation)
    }

    pub(crate) fn remove_relation(&mut self, relation: &Relation) -> bool {
        self.relations.remove(relation)
    }

    /// Check every structural invariant. Used by tests.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for (entity_id, p) in &self.placements {
            if entity_id != &p.entity_id {
                return Err(format!("placement keyed {entity_id} belongs to {}", p.entity_id));
            }
            if !self.entities.contains_key(entity_id) {
                return Err(format!("orphan placement for {entity_id}"));
            }
        }
        for r in &self.relations {
            if !self.entities.contains_key(&r.source) || !self.entities.contains_key(&r.target) {
                return Err(format!("dangling relation {} -> {}", r.source, r.target));
            }
        }
        Ok(())
    }
}
