//! Per-frame driver for one open space.

use std::collections::HashMap;
use std::sync::Arc;

use bubble_layout::{EntityId, LayerStyle, Layers, LayoutNode, Link, Position, Simulation};
use bubble_state::{
    Applied, EntityRecord, LocalMutation, Placement, PresenceRoster, Reconciler, Relation,
    SessionToken, SpaceSnapshot,
};
use glam::DVec3;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, PersistenceSink};
use crate::error::Result;
use crate::feed::{FeedSender, RemoteFeed};

/// What the render layer draws for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Frame {
    /// Ticks since the last layout (re)start.
    pub tick: u64,
    /// Simulated positions of the active layer.
    pub positions: HashMap<EntityId, Position>,
    /// Fixed ring positions of idle-layer entities.
    pub idle: HashMap<EntityId, DVec3>,
    pub settled: bool,
    /// Most recent persistence failure, until cleared.
    pub dispatch_error: Option<String>,
    /// The inbox overflowed; the caller should bulk-load again.
    pub needs_resync: bool,
}

/// Identity of the simulated graph. A rebuild that produces the same key
/// leaves the running simulation alone.
#[derive(Debug, Clone, PartialEq, Default)]
struct GraphKey {
    nodes: Vec<(EntityId, u64)>,
    links: Vec<(EntityId, EntityId)>,
}

impl GraphKey {
    fn of(nodes: &[LayoutNode], links: &[Link]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|n| (n.id.clone(), n.weight.to_bits()))
                .collect(),
            links: links
                .iter()
                .map(|l| (l.source.clone(), l.target.clone()))
                .collect(),
        }
    }
}

/// One open space: reconciler, layers and layout driven once per frame.
///
/// Entities with a placement belong to the spatial view and are left where
/// they were put. Everything else is laid out automatically, one layer at a
/// time.
#[derive(Debug)]
pub struct SpaceSession {
    config: SessionConfig,
    reconciler: Reconciler,
    layers: Layers,
    simulation: Simulation,
    feed: RemoteFeed,
    dispatcher: Dispatcher,
    presence: PresenceRoster,
    token: SessionToken,
    seen_revision: Option<u64>,
    graph: Option<GraphKey>,
    idle: HashMap<EntityId, DVec3>,
    pinned: HashMap<EntityId, DVec3>,
}

impl SpaceSession {
    /// Open a session. Must be called inside a tokio runtime.
    ///
    /// Returns the session and the sender the subscription collaborator
    /// pushes raw change payloads into.
    pub fn new(
        config: SessionConfig,
        sink: Arc<dyn PersistenceSink>,
        local_user: impl Into<String>,
    ) -> Result<(Self, FeedSender)> {
        config.validate()?;

        let reconciler = Reconciler::try_new(config.reconciler.clone())?;
        let simulation = Simulation::try_new(config.simulation.clone())?;
        let dispatcher = Dispatcher::new(sink)?;
        let (tx, feed) = RemoteFeed::channel(config.feed.capacity);
        let token = reconciler.session();

        let session = Self {
            layers: Layers::bucket(&[], &config.layers),
            config,
            reconciler,
            simulation,
            feed,
            dispatcher,
            presence: PresenceRoster::new(local_user),
            token,
            seen_revision: None,
            graph: None,
            idle: HashMap::new(),
            pinned: HashMap::new(),
        };
        Ok((session, tx))
    }

    /// Replace the space contents with a full load.
    pub fn load(
        &mut self,
        entities: impl IntoIterator<Item = EntityRecord>,
        placements: impl IntoIterator<Item = Placement>,
        relations: impl IntoIterator<Item = Relation>,
    ) {
        self.reconciler.bulk_load(entities, placements, relations);
        self.token = self.reconciler.session();
        self.rebuild();
        info!(
            entities = self.reconciler.state().len(),
            layers = self.layers.len(),
            "space loaded"
        );
    }

    /// Apply a local edit and hand it to persistence.
    pub fn apply_local(&mut self, mutation: LocalMutation) -> Result<Applied> {
        let applied = self.reconciler.apply_local(mutation)?;
        self.flush();
        Ok(applied)
    }

    /// Re-send every failed dispatch. Returns how many were re-sent.
    pub fn retry_failed(&mut self) -> usize {
        let count = self.reconciler.retry_failed();
        self.reconciler.clear_error();
        self.flush();
        count
    }

    fn flush(&mut self) {
        let dispatches = self.reconciler.take_dispatches();
        if !dispatches.is_empty() {
            self.dispatcher.send(dispatches);
        }
    }

    /// Advance one frame: pull remote changes and dispatch outcomes, merge,
    /// rebuild the layout input if the graph changed, then tick once.
    pub fn frame(&mut self) -> Frame {
        self.feed.drain_into(&mut self.reconciler, self.token);
        self.dispatcher.collect(&mut self.reconciler);
        self.reconciler.drain_remote();
        self.flush();

        if self.seen_revision != Some(self.reconciler.revision()) {
            self.rebuild();
        }

        let (tick, positions, settled) = match self.simulation.tick() {
            Some(frame) => (frame.tick, frame.positions, frame.settled),
            None => (
                self.simulation.tick_count(),
                self.simulation.positions(),
                true,
            ),
        };

        Frame {
            tick,
            positions,
            idle: self.idle.clone(),
            settled,
            dispatch_error: self.reconciler.dispatch_error().map(|f| f.reason.clone()),
            needs_resync: self.reconciler.needs_resync(),
        }
    }

    fn rebuild(&mut self) {
        let snapshot = self.reconciler.snapshot();
        self.seen_revision = Some(self.reconciler.revision());
        self.pinned.retain(|id, _| snapshot.contains(id));

        let nodes: Vec<LayoutNode> = snapshot
            .unplaced()
            .map(|e| match self.pinned.get(&e.id) {
                Some(&at) => LayoutNode::new(e.id.clone(), e.weight).pinned_at(at),
                None => LayoutNode::new(e.id.clone(), e.weight),
            })
            .collect();
        let links: Vec<Link> = snapshot
            .relations()
            .map(|r| Link::new(r.source.clone(), r.target.clone()))
            .collect();

        self.layers.rebucket(&nodes);
        self.idle = self.layers.idle_positions(self.config.idle_radius);

        let active_nodes = self.layers.active_nodes(&nodes);
        let active_links = self.layers.active_links(&links);
        let key = GraphKey::of(&active_nodes, &active_links);
        if self.graph.as_ref() == Some(&key) {
            trace!("layout graph unchanged");
            return;
        }

        debug!(
            active = active_nodes.len(),
            links = active_links.len(),
            layers = self.layers.len(),
            "layout graph changed"
        );
        self.simulation.set_graph(active_nodes, active_links);
        self.graph = Some(key);
    }

    /// Switch the simulated layer.
    pub fn set_active_layer(&mut self, index: usize) -> Result<()> {
        self.layers.set_active(index)?;
        self.rebuild();
        Ok(())
    }

    /// Layer nearest a camera depth.
    pub fn layer_at_depth(&self, camera_depth: f64) -> usize {
        self.layers.layer_at_depth(camera_depth)
    }

    /// Follow the camera: activate whichever layer is nearest `camera_depth`.
    /// Returns true if the active layer changed.
    pub fn focus_depth(&mut self, camera_depth: f64) -> Result<bool> {
        let target = self.layers.layer_at_depth(camera_depth);
        if self.layers.is_empty() || target == self.layers.active() {
            return Ok(false);
        }
        self.set_active_layer(target)?;
        Ok(true)
    }

    pub fn layer_style(&self, layer: usize) -> LayerStyle {
        self.layers.style(layer)
    }

    /// Hold an entity in place, e.g. while it is being dragged.
    pub fn pin(&mut self, id: &str, position: DVec3) -> bool {
        if !self.reconciler.state().contains(id) {
            return false;
        }
        self.pinned.insert(id.to_string(), position);
        self.simulation.pin(id, position);
        true
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        let was_pinned = self.pinned.remove(id).is_some();
        self.simulation.unpin(id);
        was_pinned
    }

    /// Close the space. Outstanding remote events, dispatch outcomes and
    /// simulation work are discarded.
    pub fn leave(&mut self) {
        self.simulation.stop();
        self.reconciler.reset();
        self.feed.close();
        self.presence.reset();
        self.token = self.reconciler.session();
        self.layers.rebucket(&[]);
        self.seen_revision = None;
        self.graph = None;
        self.idle.clear();
        self.pinned.clear();
        info!("left space");
    }

    /// Re-open after [`leave`](Self::leave) with a fresh feed. Call
    /// [`load`](Self::load) next.
    pub fn rejoin(&mut self) -> FeedSender {
        let (tx, feed) = RemoteFeed::channel(self.config.feed.capacity);
        self.feed = feed;
        self.token = self.reconciler.session();
        self.simulation.set_graph(Vec::new(), Vec::new());
        self.simulation.restart();
        tx
    }

    pub fn snapshot(&self) -> Arc<SpaceSnapshot> {
        self.reconciler.snapshot()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn presence(&self) -> &PresenceRoster {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceRoster {
        &mut self.presence
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Persistence tasks still running.
    pub fn pending_dispatches(&self) -> usize {
        self.dispatcher.pending()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
