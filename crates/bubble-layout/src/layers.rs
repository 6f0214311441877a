//! Prominence layers.
//!
//! Entities are sorted by weight (most prominent first) and sliced into
//! fixed-size layers. Only the active layer is simulated; idle layers sit on
//! rings offset along the depth axis and fade with distance from the active
//! one.

use std::collections::{HashMap, HashSet};

use bubble_geometry::Arrangement;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{EntityId, LayoutNode, Link};

/// Layer sizing and presentation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub max_nodes_per_layer: usize,
    /// Depth distance between adjacent layers.
    pub layer_spacing: f64,
    /// Scale multiplier per layer of distance from the active layer.
    pub scale_factor: f64,
    /// Opacity multiplier per layer of distance from the active layer.
    pub opacity_factor: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_layer: 20,
            layer_spacing: 200.0,
            scale_factor: 0.85,
            opacity_factor: 0.7,
        }
    }
}

impl LayerConfig {
    pub fn with_layer_size(max_nodes_per_layer: usize) -> Self {
        Self {
            max_nodes_per_layer,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_nodes_per_layer == 0 {
            return Err(Error::EmptyLayerSize);
        }
        for (name, value) in [
            ("layer_spacing", self.layer_spacing),
            ("scale_factor", self.scale_factor),
            ("opacity_factor", self.opacity_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

/// One prominence bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub index: usize,
    /// Members, most prominent first.
    pub ids: Vec<EntityId>,
}

impl Layer {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|member| member == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// How a layer is drawn relative to the active one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    /// Signed depth offset; positive is further from the camera.
    pub depth_offset: f64,
    pub scale: f64,
    pub opacity: f64,
}

impl LayerStyle {
    pub const ACTIVE: Self = Self {
        depth_offset: 0.0,
        scale: 1.0,
        opacity: 1.0,
    };
}

/// A bucketed entity set with one active layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layers {
    layers: Vec<Layer>,
    membership: HashMap<EntityId, usize>,
    active: usize,
    config: LayerConfig,
}

impl Layers {
    /// Bucket `nodes` by descending weight. Equal weights keep input order.
    ///
    /// A zero layer size is treated as one entity per layer; validate the
    /// config first to reject it instead.
    pub fn bucket(nodes: &[LayoutNode], config: &LayerConfig) -> Self {
        let size = config.max_nodes_per_layer.max(1);

        let mut order: Vec<usize> = (0..nodes.len()).collect();
        // sort_by is stable, so ties stay in input order
        order.sort_by(|&a, &b| nodes[b].weight.total_cmp(&nodes[a].weight));

        let mut seen = HashSet::with_capacity(nodes.len());
        let ranked: Vec<EntityId> = order
            .into_iter()
            .map(|i| &nodes[i].id)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut membership = HashMap::with_capacity(ranked.len());
        let layers: Vec<Layer> = ranked
            .chunks(size)
            .enumerate()
            .map(|(index, chunk)| {
                for id in chunk {
                    membership.insert(id.clone(), index);
                }
                Layer {
                    index,
                    ids: chunk.to_vec(),
                }
            })
            .collect();

        Self {
            layers,
            membership,
            active: 0,
            config: config.clone(),
        }
    }

    /// Re-bucket, keeping the active index when it is still in range.
    pub fn rebucket(&mut self, nodes: &[LayoutNode]) {
        let active = self.active;
        *self = Self::bucket(nodes, &self.config);
        self.active = active.min(self.layers.len().saturating_sub(1));
    }

    pub fn layer_of(&self, id: &str) -> Option<usize> {
        self.membership.get(id).copied()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active)
    }

    pub fn set_active(&mut self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(Error::LayerOutOfRange {
                requested: index,
                available: self.layers.len(),
            });
        }
        self.active = index;
        Ok(())
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    fn is_active(&self, id: &str) -> bool {
        self.layer_of(id) == Some(self.active)
    }

    /// The subset of `nodes` in the active layer, in input order.
    pub fn active_nodes(&self, nodes: &[LayoutNode]) -> Vec<LayoutNode> {
        let mut seen = HashSet::new();
        nodes
            .iter()
            .filter(|n| self.is_active(&n.id) && seen.insert(n.id.as_str()))
            .cloned()
            .collect()
    }

    /// Links with both endpoints in the active layer.
    pub fn active_links(&self, links: &[Link]) -> Vec<Link> {
        links
            .iter()
            .filter(|l| self.is_active(&l.source) && self.is_active(&l.target))
            .cloned()
            .collect()
    }

    /// Static positions for every idle-layer entity: a ring per layer at the
    /// layer's depth offset.
    pub fn idle_positions(&self, radius: f64) -> HashMap<EntityId, DVec3> {
        let ring = Arrangement::Ring { radius };
        let mut out = HashMap::new();
        for layer in self.layers.iter().filter(|l| l.index != self.active) {
            let depth = self.style(layer.index).depth_offset;
            for (i, id) in layer.ids.iter().enumerate() {
                let p = ring.position(i, layer.ids.len());
                out.insert(id.clone(), DVec3::new(p.x, p.y, depth));
            }
        }
        out
    }

    /// Presentation of `layer` relative to the active layer.
    pub fn style(&self, layer: usize) -> LayerStyle {
        let offset = layer as f64 - self.active as f64;
        let distance = offset.abs() as i32;
        LayerStyle {
            depth_offset: offset * self.config.layer_spacing,
            scale: self.config.scale_factor.powi(distance),
            opacity: self.config.opacity_factor.powi(distance),
        }
    }

    /// Layer nearest a camera depth, clamped to the existing layers.
    pub fn layer_at_depth(&self, camera_depth: f64) -> usize {
        if self.layers.is_empty() || self.config.layer_spacing <= 0.0 || !camera_depth.is_finite() {
            return 0;
        }
        let raw = (camera_depth / self.config.layer_spacing).round();
        raw.clamp(0.0, (self.layers.len() - 1) as f64) as usize
    }

    /// Camera depth that centres on `layer`.
    pub fn depth_of(&self, layer: usize) -> f64 {
        layer as f64 * self.config.layer_spacing
    }
}
