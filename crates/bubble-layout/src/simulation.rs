//! Frame-driven force simulation.

use std::collections::HashMap;

use bubble_geometry::{random_in_shell, SHELL_HEIGHT_OFFSET, SHELL_MAX_RADIUS};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::forces::{self, Body, Spring};
use crate::graph::{EntityId, LayoutNode, Link, Position, TickFrame};

/// Alpha after a warm restart (entity set changed mid-run).
pub const WARM_RESTART_ALPHA: f64 = 0.3;

/// Above this many bodies, collision candidates come from a spatial grid.
const CONTACT_GRID_THRESHOLD: usize = 128;

const MAX_SEPARATION_PASSES: usize = 64;
const OVERLAP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Settled,
    Stopped,
}

/// Incremental force-directed layout.
///
/// Call [`Simulation::tick`] once per animation frame. Each call returns a
/// complete position map until alpha cools below `alpha_min`; the frame that
/// crosses the threshold has `settled = true` and later calls return `None`.
pub struct Simulation {
    config: SimulationConfig,
    ids: Vec<EntityId>,
    index: HashMap<EntityId, usize>,
    weights: Vec<f64>,
    bodies: Vec<Body>,
    springs: Vec<Spring>,
    alpha: f64,
    tick: u64,
    state: RunState,
    rng: StdRng,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("entities", &self.bodies.len())
            .field("links", &self.springs.len())
            .field("alpha", &self.alpha)
            .field("tick", &self.tick)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create an empty simulation.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            alpha: config.forces.alpha_start,
            config,
            ids: Vec::new(),
            index: HashMap::new(),
            weights: Vec::new(),
            bodies: Vec::new(),
            springs: Vec::new(),
            tick: 0,
            state: RunState::Running,
            rng,
        }
    }

    /// Create a simulation after validating its configuration.
    pub fn try_new(config: SimulationConfig) -> Result<Self> {
        config.forces.validate()?;
        Ok(Self::new(config))
    }

    /// Create a simulation over an initial graph.
    pub fn with_graph(config: SimulationConfig, nodes: Vec<LayoutNode>, links: Vec<Link>) -> Self {
        let mut sim = Self::new(config);
        sim.load(nodes, &links);
        sim
    }

    /// Replace the entity and relation set.
    ///
    /// Entities that were already present keep their current position and
    /// velocity; the simulation reheats so it re-converges from there.
    pub fn set_graph(&mut self, nodes: Vec<LayoutNode>, links: Vec<Link>) {
        self.load(nodes, &links);
        self.alpha = self.alpha.max(WARM_RESTART_ALPHA.min(self.config.forces.alpha_start));
        self.tick = 0;
        if self.state == RunState::Settled {
            self.state = RunState::Running;
        }
        debug!(entities = self.bodies.len(), links = self.springs.len(), "layout warm restart");
    }

    fn load(&mut self, nodes: Vec<LayoutNode>, links: &[Link]) {
        let forces = self.config.forces.clone();
        let spread = forces.link_distance.max(forces.collide_radius * 4.0)
            * (nodes.len() as f64).sqrt().max(1.0);

        let mut ids = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());
        let mut weights = Vec::with_capacity(nodes.len());
        let mut bodies = Vec::with_capacity(nodes.len());

        for node in nodes {
            if index.contains_key(&node.id) {
                warn!(id = %node.id, "duplicate layout entity ignored");
                continue;
            }

            let previous = self.index.get(&node.id).map(|&i| self.bodies[i]);
            let (position, velocity) = match (node.position, previous) {
                (Some(p), _) if node.pinned => (p, DVec3::ZERO),
                (_, Some(prev)) if !prev.pinned => (prev.position, prev.velocity),
                (Some(p), _) => (p, DVec3::ZERO),
                (None, Some(prev)) => (prev.position, DVec3::ZERO),
                (None, None) => (self.random_position(spread), DVec3::ZERO),
            };

            index.insert(node.id.clone(), bodies.len());
            weights.push(node.weight);
            bodies.push(Body {
                position: self.flatten(position),
                velocity: self.flatten(velocity),
                radius: forces.radius_for(node.weight),
                pinned: node.pinned,
            });
            ids.push(node.id);
        }

        self.ids = ids;
        self.index = index;
        self.weights = weights;
        self.bodies = bodies;
        self.springs = self.resolve_links(links);
    }

    fn resolve_links(&self, links: &[Link]) -> Vec<Spring> {
        let forces = &self.config.forces;
        let resolved: Vec<(usize, usize, &Link)> = links
            .iter()
            .filter_map(|link| {
                match (self.index.get(&link.source), self.index.get(&link.target)) {
                    (Some(&s), Some(&t)) if s != t => Some((s, t, link)),
                    _ => {
                        trace!(source = %link.source, target = %link.target, "link endpoint not in layout");
                        None
                    }
                }
            })
            .collect();

        let mut degree = vec![0usize; self.bodies.len()];
        for &(s, t, _) in &resolved {
            degree[s] += 1;
            degree[t] += 1;
        }

        resolved
            .into_iter()
            .map(|(s, t, link)| Spring {
                source: s,
                target: t,
                distance: link.distance.unwrap_or(forces.link_distance),
                strength: link.strength.unwrap_or(forces.link_strength),
                bias: degree[s] as f64 / (degree[s] + degree[t]) as f64,
            })
            .collect()
    }

    fn random_position(&mut self, spread: f64) -> DVec3 {
        if self.config.dimensions.is_3d() {
            let p = random_in_shell(&mut self.rng) - DVec3::Y * SHELL_HEIGHT_OFFSET;
            return p * (spread / SHELL_MAX_RADIUS);
        }
        let r = spread * self.rng.gen::<f64>().sqrt();
        let theta = self.rng.gen_range(0.0..std::f64::consts::TAU);
        DVec3::new(r * theta.cos(), r * theta.sin(), 0.0)
    }

    fn flatten(&self, v: DVec3) -> DVec3 {
        if self.config.dimensions.is_3d() {
            v
        } else {
            v.truncate().extend(0.0)
        }
    }

    /// Advance one frame.
    ///
    /// Returns `None` once the layout has settled or the simulation was
    /// stopped. An empty simulation emits a single empty, settled frame.
    pub fn tick(&mut self) -> Option<TickFrame> {
        if self.state != RunState::Running {
            return None;
        }

        if self.bodies.is_empty() {
            self.state = RunState::Settled;
            return Some(TickFrame {
                tick: self.tick,
                alpha: self.alpha,
                positions: HashMap::new(),
                settled: true,
            });
        }

        self.step();
        self.tick += 1;

        let settled = self.alpha < self.config.forces.alpha_min;
        if settled {
            self.resolve_overlaps();
            self.state = RunState::Settled;
            debug!(ticks = self.tick, entities = self.bodies.len(), "layout settled");
        } else {
            trace!(tick = self.tick, alpha = self.alpha, "layout tick");
        }

        Some(TickFrame {
            tick: self.tick,
            alpha: self.alpha,
            positions: self.positions(),
            settled,
        })
    }

    fn step(&mut self) {
        let params = &self.config.forces;
        self.alpha += (0.0 - self.alpha) * params.alpha_decay;
        let alpha = self.alpha;

        if self.bodies.len() > params.barnes_hut_threshold {
            forces::many_body_approx(
                &mut self.bodies,
                params.charge_strength,
                alpha,
                params.min_distance,
                params.theta,
            );
        } else {
            forces::many_body_exact(&mut self.bodies, params.charge_strength, alpha, params.min_distance);
        }
        forces::links(&mut self.bodies, &self.springs, alpha);
        let pairs = forces::contact_pairs(&self.bodies, CONTACT_GRID_THRESHOLD);
        forces::collide(&mut self.bodies, &pairs, params.collide_strength);
        forces::gravity(&mut self.bodies, params.gravity, alpha);

        let keep = 1.0 - params.velocity_decay;
        let flat = !self.config.dimensions.is_3d();
        for body in &mut self.bodies {
            if body.pinned {
                body.velocity = DVec3::ZERO;
                continue;
            }
            body.velocity *= keep;
            if flat {
                body.velocity.z = 0.0;
            }
            body.position += body.velocity;
        }

        forces::center(&mut self.bodies, params.center_strength);
        let pairs = forces::contact_pairs(&self.bodies, CONTACT_GRID_THRESHOLD);
        forces::separate(&mut self.bodies, &pairs);

        self.sanitize();
    }

    /// Separate until no pair overlaps or the pass budget runs out.
    fn resolve_overlaps(&mut self) {
        for pass in 0..MAX_SEPARATION_PASSES {
            let pairs = forces::contact_pairs(&self.bodies, CONTACT_GRID_THRESHOLD);
            let worst = forces::separate(&mut self.bodies, &pairs);
            if worst <= OVERLAP_TOLERANCE {
                return;
            }
            trace!(pass, worst, "separating overlaps");
        }
        warn!(entities = self.bodies.len(), "overlaps remain after separation passes");
    }

    fn sanitize(&mut self) {
        for (i, body) in self.bodies.iter_mut().enumerate() {
            if !body.position.is_finite() || !body.velocity.is_finite() {
                warn!(id = %self.ids[i], "non-finite layout state reset");
                if !body.position.is_finite() {
                    body.position = DVec3::ZERO;
                }
                body.velocity = DVec3::ZERO;
            }
        }
    }

    /// Current position of every entity, without ticking.
    pub fn positions(&self) -> HashMap<EntityId, Position> {
        let dims = self.config.dimensions;
        self.ids
            .iter()
            .zip(&self.bodies)
            .map(|(id, body)| (id.clone(), Position::from_vec(body.position, dims)))
            .collect()
    }

    /// Current position of one entity.
    pub fn position(&self, id: &str) -> Option<Position> {
        self.index
            .get(id)
            .map(|&i| Position::from_vec(self.bodies[i].position, self.config.dimensions))
    }

    /// Collision radius of one entity.
    pub fn radius(&self, id: &str) -> Option<f64> {
        self.index.get(id).map(|&i| self.bodies[i].radius)
    }

    /// Weight an entity was loaded with.
    pub fn weight(&self, id: &str) -> Option<f64> {
        self.index.get(id).map(|&i| self.weights[i])
    }

    /// Fix an entity at a manual position. Returns false if unknown.
    pub fn pin(&mut self, id: &str, position: DVec3) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        let position = self.flatten(position);
        let body = &mut self.bodies[i];
        body.position = position;
        body.velocity = DVec3::ZERO;
        body.pinned = true;
        true
    }

    /// Release a pinned entity back to the forces. Returns false if unknown.
    pub fn unpin(&mut self, id: &str) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.bodies[i].pinned = false;
                true
            }
            None => false,
        }
    }

    /// Stop ticking. Nothing is scheduled afterwards; `tick` returns `None`.
    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            debug!(tick = self.tick, "layout stopped");
        }
        self.state = RunState::Stopped;
    }

    /// Reheat to `alpha_start` and resume ticking from current positions.
    pub fn restart(&mut self) {
        self.alpha = self.config.forces.alpha_start;
        self.tick = 0;
        self.state = RunState::Running;
    }

    /// Tick until settled or `max_ticks` frames were emitted. Returns the
    /// last frame.
    pub fn run_to_settle(&mut self, max_ticks: usize) -> Option<TickFrame> {
        let mut last = None;
        for _ in 0..max_ticks {
            match self.tick() {
                Some(frame) => last = Some(frame),
                None => break,
            }
        }
        last
    }

    pub fn is_settled(&self) -> bool {
        self.state == RunState::Settled
    }

    pub fn is_stopped(&self) -> bool {
        self.state == RunState::Stopped
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Ticks since the last (re)start.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Links that resolved to two present entities.
    pub fn active_link_count(&self) -> usize {
        self.springs.len()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Entity ids in load order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }
}
