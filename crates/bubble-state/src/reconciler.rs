//! Live state reconciler.
//!
//! Merges three inputs into one snapshot per space:
//!
//! - **Bulk load** replaces everything on space entry
//! - **Local mutations** apply immediately and queue a dispatch for
//!   persistence
//! - **Remote events** are buffered by the subscription callback and merged
//!   once per frame, last-write-wins on placement timestamps
//!
//! Every operation is a synchronous in-memory transition. Readers hold
//! `Arc<SpaceSnapshot>` values that are never mutated; writes go through
//! `Arc::make_mut`, so a snapshot handed out earlier stays as it was.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::event::{EntityEvent, PlacementEvent, PlacementRef, RelationEvent, RemoteEvent};
use crate::model::{now_ms, Entity, EntityId, EntityRecord, Placement, Relation, Timestamp};
use crate::mutation::{Applied, Dispatch, DispatchFailure, DispatchId, LocalMutation};
use crate::snapshot::SpaceSnapshot;

/// Identifies one reconciler session. Tokens issued before a
/// [`Reconciler::reset`] are refused afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken {
    generation: u64,
}

impl SessionToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Whether a remote event changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    Ignored,
}

/// Counts from one inbox drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub ignored: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.applied + self.ignored
    }
}

/// Single-writer store for one space.
#[derive(Debug)]
pub struct Reconciler {
    config: ReconcilerConfig,
    state: Arc<SpaceSnapshot>,
    generation: u64,
    revision: u64,
    loaded: bool,

    /// Local placement edits not yet echoed back, by entity id.
    pending: HashMap<EntityId, Timestamp>,

    inbox: VecDeque<RemoteEvent>,
    needs_resync: bool,

    next_dispatch: u64,
    outbox: VecDeque<Dispatch>,
    in_flight: BTreeMap<DispatchId, Dispatch>,
    failed: VecDeque<DispatchFailure>,
    last_error: Option<DispatchFailure>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            state: Arc::new(SpaceSnapshot::default()),
            generation: 0,
            revision: 0,
            loaded: false,
            pending: HashMap::new(),
            inbox: VecDeque::new(),
            needs_resync: false,
            next_dispatch: 0,
            outbox: VecDeque::new(),
            in_flight: BTreeMap::new(),
            failed: VecDeque::new(),
            last_error: None,
        }
    }

    pub fn try_new(config: ReconcilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    fn state_mut(&mut self) -> &mut SpaceSnapshot {
        self.revision += 1;
        Arc::make_mut(&mut self.state)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current snapshot. Never recomputes.
    pub fn snapshot(&self) -> Arc<SpaceSnapshot> {
        Arc::clone(&self.state)
    }

    /// Borrow the current snapshot without bumping the refcount.
    pub fn state(&self) -> &SpaceSnapshot {
        &self.state
    }

    /// Increments on every state change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn session(&self) -> SessionToken {
        SessionToken {
            generation: self.generation,
        }
    }

    /// Set when remote events were refused for lack of inbox space. The
    /// boundary should re-fetch and `bulk_load`.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Timestamp of an unconfirmed local placement edit.
    pub fn pending_edit(&self, entity_id: &str) -> Option<Timestamp> {
        self.pending.get(entity_id).copied()
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Bulk load / reset
    // ------------------------------------------------------------------

    /// Replace the whole state.
    ///
    /// Entities without a placement are fine. Placements and relations that
    /// reference unknown entities are dropped; for duplicate ids the first
    /// occurrence wins.
    pub fn bulk_load(
        &mut self,
        entities: impl IntoIterator<Item = EntityRecord>,
        placements: impl IntoIterator<Item = Placement>,
        relations: impl IntoIterator<Item = Relation>,
    ) {
        let mut snap = SpaceSnapshot::default();
        let mut embedded = Vec::new();

        for record in entities {
            if snap.contains(&record.entity.id) {
                warn!(entity = %record.entity.id, "duplicate entity in bulk load ignored");
                continue;
            }
            snap.insert_entity(record.entity);
            embedded.extend(record.placement);
        }

        for placement in embedded.into_iter().chain(placements) {
            if !snap.contains(&placement.entity_id) {
                warn!(entity = %placement.entity_id, "placement for unknown entity dropped");
            } else if snap.placement(&placement.entity_id).is_some() {
                warn!(entity = %placement.entity_id, "duplicate placement in bulk load ignored");
            } else {
                snap.set_placement(placement);
            }
        }

        for relation in relations {
            if snap.contains(&relation.source) && snap.contains(&relation.target) {
                snap.insert_relation(relation);
            } else {
                warn!(source = %relation.source, target = %relation.target, "relation with missing endpoint dropped");
            }
        }

        debug!(
            entities = snap.len(),
            placements = snap.placement_count(),
            relations = snap.relation_count(),
            "bulk load"
        );

        self.state = Arc::new(snap);
        self.revision += 1;
        self.pending.clear();
        self.needs_resync = false;
        self.loaded = true;
    }

    /// Discard everything and invalidate outstanding session tokens.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.revision += 1;
        self.state = Arc::new(SpaceSnapshot::default());
        self.loaded = false;
        self.pending.clear();
        self.inbox.clear();
        self.needs_resync = false;
        self.outbox.clear();
        self.in_flight.clear();
        self.failed.clear();
        self.last_error = None;
        debug!(generation = self.generation, "reconciler reset");
    }

    // ------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------

    /// Apply a local edit synchronously, then queue it for persistence.
    ///
    /// A mutation that would break an invariant is rejected and changes
    /// nothing. Removing something already absent is a no-op.
    pub fn apply_local(&mut self, mutation: LocalMutation) -> Result<Applied> {
        let mutation = self.prepare(mutation);

        let changed = match &mutation {
            LocalMutation::CreateEntity { entity, placement } => {
                if self.state.contains(&entity.id) {
                    return Err(Error::DuplicateEntity(entity.id.clone()));
                }
                if let Some(p) = placement {
                    if p.entity_id != entity.id {
                        return Err(Error::UnknownEntity(p.entity_id.clone()));
                    }
                }
                let state = self.state_mut();
                state.insert_entity(entity.clone());
                if let Some(p) = placement {
                    state.set_placement(p.clone());
                    self.mark_pending(p);
                }
                true
            }
            LocalMutation::UpdatePlacement { placement } | LocalMutation::DragPlacement { placement } => {
                if !self.state.contains(&placement.entity_id) {
                    return Err(Error::UnknownEntity(placement.entity_id.clone()));
                }
                self.state_mut().set_placement(placement.clone());
                self.mark_pending(placement);
                true
            }
            LocalMutation::DeleteEntity { id } => {
                if self.state.contains(id) {
                    self.state_mut().remove_entity(id);
                    self.pending.remove(id);
                    true
                } else {
                    false
                }
            }
            LocalMutation::AddRelation { relation } => {
                if !self.state.contains(&relation.source) || !self.state.contains(&relation.target) {
                    return Err(Error::MissingEndpoint {
                        from: relation.source.clone(),
                        to: relation.target.clone(),
                    });
                }
                !self.state.has_relation(relation) && self.state_mut().insert_relation(relation.clone())
            }
            LocalMutation::RemoveRelation { relation } => {
                self.state.has_relation(relation) && self.state_mut().remove_relation(relation)
            }
        };

        if !changed {
            trace!(?mutation, "local mutation was a no-op");
            return Ok(Applied::UNCHANGED);
        }

        let dispatch = mutation.is_durable().then(|| self.enqueue_dispatch(mutation));
        Ok(Applied {
            changed: true,
            dispatch,
        })
    }

    /// Stamp placements with the local clock and carry over the row id.
    fn prepare(&self, mut mutation: LocalMutation) -> LocalMutation {
        let placement = match &mut mutation {
            LocalMutation::CreateEntity { placement, .. } => placement.as_mut(),
            LocalMutation::UpdatePlacement { placement } | LocalMutation::DragPlacement { placement } => {
                Some(placement)
            }
            _ => None,
        };
        if let Some(p) = placement {
            if p.updated_at.is_none() {
                p.updated_at = Some(now_ms());
            }
            if p.id.is_none() {
                p.id = self.state.placement(&p.entity_id).and_then(|c| c.id.clone());
            }
        }
        mutation
    }

    fn mark_pending(&mut self, placement: &Placement) {
        let ts = placement.updated_at.unwrap_or_default();
        self.pending.insert(placement.entity_id.clone(), ts);
    }

    // ------------------------------------------------------------------
    // Remote events
    // ------------------------------------------------------------------

    fn check_session(&self, token: SessionToken) -> Result<()> {
        if token.generation != self.generation {
            debug!(token = token.generation, current = self.generation, "stale session event refused");
            return Err(Error::StaleSession {
                token: token.generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    /// Buffer a remote event for the next [`drain_remote`](Self::drain_remote).
    pub fn enqueue_remote(&mut self, token: SessionToken, event: RemoteEvent) -> Result<()> {
        self.check_session(token)?;
        if self.inbox.len() >= self.config.inbox_capacity {
            if !self.needs_resync {
                warn!(capacity = self.config.inbox_capacity, "remote inbox full, resync required");
            }
            self.needs_resync = true;
            return Err(Error::InboxFull(self.config.inbox_capacity));
        }
        self.inbox.push_back(event);
        Ok(())
    }

    /// Validate a raw pub/sub payload and buffer it. Malformed payloads are
    /// logged and dropped.
    pub fn enqueue_raw(&mut self, token: SessionToken, value: Value) -> Result<()> {
        self.check_session(token)?;
        match RemoteEvent::from_value(value) {
            Ok(event) => self.enqueue_remote(token, event),
            Err(e) => {
                warn!(error = %e, "dropping malformed remote event");
                Err(e)
            }
        }
    }

    /// Apply every buffered remote event in arrival order.
    pub fn drain_remote(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(event) = self.inbox.pop_front() {
            match self.apply_remote(event) {
                MergeOutcome::Applied => report.applied += 1,
                MergeOutcome::Ignored => report.ignored += 1,
            }
        }
        if report.total() > 0 {
            trace!(applied = report.applied, ignored = report.ignored, "drained remote events");
        }
        report
    }

    /// Merge one remote event. Applying the same event twice has the same
    /// effect as applying it once.
    pub fn apply_remote(&mut self, event: RemoteEvent) -> MergeOutcome {
        match event {
            RemoteEvent::Entity(EntityEvent::Insert(record)) => self.merge_entity_insert(record),
            RemoteEvent::Entity(EntityEvent::Update(entity)) => self.merge_entity_update(entity),
            RemoteEvent::Entity(EntityEvent::Delete { id }) => self.merge_entity_delete(&id),
            RemoteEvent::Placement(
                PlacementEvent::Insert { placement, entity } | PlacementEvent::Update { placement, entity },
            ) => self.merge_placement(placement, entity),
            RemoteEvent::Placement(PlacementEvent::Delete(key)) => self.merge_placement_delete(&key),
            RemoteEvent::Relation(RelationEvent::Insert(r) | RelationEvent::Update(r)) => {
                self.merge_relation(r)
            }
            RemoteEvent::Relation(RelationEvent::Delete(r)) => {
                if self.state.has_relation(&r) {
                    self.state_mut().remove_relation(&r);
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::Ignored
                }
            }
        }
    }

    fn merge_entity_insert(&mut self, record: EntityRecord) -> MergeOutcome {
        let EntityRecord { entity, placement } = record;
        let placement = placement.filter(|p| {
            let matches = p.entity_id == entity.id;
            if !matches {
                warn!(entity = %entity.id, placement_for = %p.entity_id, "mismatched embedded placement dropped");
            }
            matches
        });

        if self.state.contains(&entity.id) {
            // Existing entity: fields stay, the placement may still be newer.
            return match placement {
                Some(p) => self.merge_placement(p, None),
                None => MergeOutcome::Ignored,
            };
        }

        let state = self.state_mut();
        state.insert_entity(entity);
        if let Some(p) = placement {
            state.set_placement(p);
        }
        MergeOutcome::Applied
    }

    fn merge_entity_update(&mut self, entity: Entity) -> MergeOutcome {
        match self.state.entity(&entity.id).map(|current| *current == entity) {
            Some(true) => MergeOutcome::Ignored,
            Some(false) => {
                self.state_mut().replace_entity(entity);
                MergeOutcome::Applied
            }
            None => {
                debug!(entity = %entity.id, "update for unknown entity ignored");
                MergeOutcome::Ignored
            }
        }
    }

    fn merge_entity_delete(&mut self, id: &str) -> MergeOutcome {
        if !self.state.contains(id) {
            return MergeOutcome::Ignored;
        }
        self.state_mut().remove_entity(id);
        self.pending.remove(id);
        MergeOutcome::Applied
    }

    fn merge_placement(&mut self, mut placement: Placement, entity: Option<Entity>) -> MergeOutcome {
        let id = placement.entity_id.clone();

        if !self.state.contains(&id) {
            return match entity {
                Some(e) if e.id == id => {
                    let state = self.state_mut();
                    state.insert_entity(e);
                    state.set_placement(placement);
                    MergeOutcome::Applied
                }
                _ => {
                    warn!(entity = %id, "placement for unknown entity dropped");
                    MergeOutcome::Ignored
                }
            };
        }

        if !self.remote_placement_wins(&placement) {
            trace!(entity = %id, "remote placement lost last-write-wins");
            return MergeOutcome::Ignored;
        }

        let current = self.state.placement(&id);
        if placement.id.is_none() {
            placement.id = current.and_then(|c| c.id.clone());
        }
        if current == Some(&placement) {
            return MergeOutcome::Ignored;
        }
        self.state_mut().set_placement(placement);
        MergeOutcome::Applied
    }

    /// Last-write-wins with a pending-edit guard.
    ///
    /// A timestamped remote placement wins only if strictly newer than the
    /// current one; an equal timestamp keeps the current value. A remote
    /// timestamp at or after the local edit confirms that edit. Without a
    /// timestamp the remote wins unless a local edit is still pending.
    fn remote_placement_wins(&mut self, incoming: &Placement) -> bool {
        let id = &incoming.entity_id;
        let current = self.state.placement(id).and_then(|p| p.updated_at);
        let pending = self.pending.get(id).copied();

        match incoming.updated_at {
            Some(ts) => {
                if pending.is_some_and(|local| ts >= local) {
                    self.pending.remove(id);
                }
                current.map_or(true, |cur| ts > cur)
            }
            None => pending.is_none(),
        }
    }

    fn merge_placement_delete(&mut self, key: &PlacementRef) -> MergeOutcome {
        let entity_id = match (&key.entity_id, &key.id) {
            (Some(entity_id), _) => Some(entity_id.clone()),
            (None, Some(pid)) => self.state.placement_by_id(pid).map(|p| p.entity_id.clone()),
            (None, None) => None,
        };
        let Some(entity_id) = entity_id else {
            return MergeOutcome::Ignored;
        };
        let Some(current) = self.state.placement(&entity_id) else {
            return MergeOutcome::Ignored;
        };
        // A delete for an older row must not remove its replacement.
        if let (Some(want), Some(have)) = (&key.id, &current.id) {
            if want != have {
                return MergeOutcome::Ignored;
            }
        }
        // Removing a placement takes the entity out of the space.
        self.state_mut().remove_entity(&entity_id);
        self.pending.remove(&entity_id);
        MergeOutcome::Applied
    }

    fn merge_relation(&mut self, relation: Relation) -> MergeOutcome {
        if !self.state.contains(&relation.source) || !self.state.contains(&relation.target) {
            warn!(source = %relation.source, target = %relation.target, "relation with missing endpoint dropped");
            return MergeOutcome::Ignored;
        }
        if self.state.has_relation(&relation) {
            return MergeOutcome::Ignored;
        }
        self.state_mut().insert_relation(relation);
        MergeOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Dispatch outbox
    // ------------------------------------------------------------------

    fn enqueue_dispatch(&mut self, mutation: LocalMutation) -> DispatchId {
        let id = DispatchId(self.next_dispatch);
        self.next_dispatch += 1;
        self.outbox.push_back(Dispatch { id, mutation });
        id
    }

    /// Hand queued dispatches to the persistence collaborator. They stay
    /// in flight until reported back.
    pub fn take_dispatches(&mut self) -> Vec<Dispatch> {
        let taken: Vec<Dispatch> = self.outbox.drain(..).collect();
        for d in &taken {
            self.in_flight.insert(d.id, d.clone());
        }
        taken
    }

    pub fn dispatch_succeeded(&mut self, id: DispatchId) -> bool {
        self.in_flight.remove(&id).is_some()
    }

    /// Record a failed dispatch. Optimistic state is kept as is; the failure
    /// is exposed via [`dispatch_error`](Self::dispatch_error) and kept for
    /// [`retry_failed`](Self::retry_failed).
    pub fn dispatch_failed(&mut self, id: DispatchId, reason: impl Into<String>) -> bool {
        let Some(dispatch) = self.in_flight.remove(&id) else {
            return false;
        };
        let failure = DispatchFailure {
            dispatch,
            reason: reason.into(),
        };
        warn!(dispatch = %id, reason = %failure.reason, "dispatch failed");

        self.last_error = Some(failure.clone());
        self.failed.push_back(failure);
        while self.failed.len() > self.config.max_failed {
            if let Some(dropped) = self.failed.pop_front() {
                warn!(dispatch = %dropped.dispatch.id, "failed dispatch evicted from retry list");
            }
        }
        true
    }

    /// Most recent dispatch failure, until cleared.
    pub fn dispatch_error(&self) -> Option<&DispatchFailure> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn failed_dispatches(&self) -> impl Iterator<Item = &DispatchFailure> {
        self.failed.iter()
    }

    /// Re-queue every failed dispatch. Returns how many were re-queued.
    pub fn retry_failed(&mut self) -> usize {
        let count = self.failed.len();
        self.outbox.extend(self.failed.drain(..).map(|f| f.dispatch));
        if count > 0 {
            debug!(count, "re-queued failed dispatches");
        }
        count
    }

    pub fn queued_dispatches(&self) -> usize {
        self.outbox.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
