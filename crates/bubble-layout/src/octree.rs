//! Barnes–Hut octree for approximate many-body repulsion.
//!
//! Cells far enough from a body (cell width / distance < theta) act as a
//! single point charge at their centre of mass. In 2D mode every body shares
//! z = 0, so only one z half of each cell is ever populated and the tree
//! degenerates to a quadtree.

use glam::DVec3;

use crate::forces::jiggle;

/// Subdivision stops here; deeper bodies share a leaf (coincident points).
const MAX_DEPTH: u32 = 32;

const NONE: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Cell {
    center: DVec3,
    half: f64,
    mass: f64,
    center_of_mass: DVec3,
    children: [u32; 8],
    bodies: Vec<usize>,
}

impl Cell {
    fn new(center: DVec3, half: f64) -> Self {
        Self {
            center,
            half,
            mass: 0.0,
            center_of_mass: DVec3::ZERO,
            children: [NONE; 8],
            bodies: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(|&c| c == NONE)
    }

    fn octant(&self, p: DVec3) -> usize {
        ((p.x >= self.center.x) as usize)
            | (((p.y >= self.center.y) as usize) << 1)
            | (((p.z >= self.center.z) as usize) << 2)
    }

    fn child_center(&self, octant: usize) -> DVec3 {
        let q = self.half / 2.0;
        let sign = |bit: usize| if octant & bit != 0 { q } else { -q };
        self.center + DVec3::new(sign(1), sign(2), sign(4))
    }

    fn contains(&self, p: DVec3) -> bool {
        (p - self.center).abs().max_element() <= self.half
    }
}

/// Spatial index over one tick's positions.
#[derive(Debug, Clone)]
pub(crate) struct Octree {
    cells: Vec<Cell>,
}

impl Octree {
    /// Build a tree over `positions`. Empty input yields an empty tree.
    pub(crate) fn build(positions: &[DVec3]) -> Self {
        let mut tree = Self { cells: Vec::new() };
        if positions.is_empty() {
            return tree;
        }

        let (min, max) = positions.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        let center = (min + max) / 2.0;
        let half = ((max - min).max_element() / 2.0).max(1.0) * (1.0 + 1e-9);
        tree.cells.push(Cell::new(center, half));

        for (body, &p) in positions.iter().enumerate() {
            tree.insert(0, body, p, positions, 0);
        }
        tree.summarize(0, positions);
        tree
    }

    fn insert(&mut self, cell: usize, body: usize, p: DVec3, positions: &[DVec3], depth: u32) {
        if self.cells[cell].is_leaf() {
            if self.cells[cell].bodies.is_empty() || depth >= MAX_DEPTH {
                self.cells[cell].bodies.push(body);
                return;
            }
            // Split: push the resident bodies one level down.
            let residents = std::mem::take(&mut self.cells[cell].bodies);
            for resident in residents {
                let child = self.child(cell, positions[resident]);
                self.insert(child, resident, positions[resident], positions, depth + 1);
            }
        }
        let child = self.child(cell, p);
        self.insert(child, body, p, positions, depth + 1);
    }

    fn child(&mut self, cell: usize, p: DVec3) -> usize {
        let octant = self.cells[cell].octant(p);
        let existing = self.cells[cell].children[octant];
        if existing != NONE {
            return existing as usize;
        }
        let center = self.cells[cell].child_center(octant);
        let half = self.cells[cell].half / 2.0;
        let index = self.cells.len();
        self.cells.push(Cell::new(center, half));
        self.cells[cell].children[octant] = index as u32;
        index
    }

    fn summarize(&mut self, cell: usize, positions: &[DVec3]) -> (f64, DVec3) {
        let mut mass = self.cells[cell].bodies.len() as f64;
        let mut weighted: DVec3 = self.cells[cell].bodies.iter().map(|&b| positions[b]).sum();

        let children = self.cells[cell].children;
        for child in children.into_iter().filter(|&c| c != NONE) {
            let (m, w) = self.summarize(child as usize, positions);
            mass += m;
            weighted += w;
        }

        let c = &mut self.cells[cell];
        c.mass = mass;
        c.center_of_mass = if mass > 0.0 { weighted / mass } else { c.center };
        (mass, weighted)
    }

    /// Sum of `delta / distance²` from `body` toward every other body, with
    /// distant cells collapsed to their centre of mass.
    ///
    /// Multiply by `strength * alpha` to get the velocity change.
    pub(crate) fn field_at(&self, body: usize, positions: &[DVec3], theta: f64, min_distance: f64) -> DVec3 {
        let mut acc = DVec3::ZERO;
        if self.cells.is_empty() {
            return acc;
        }

        let p = positions[body];
        let theta2 = theta * theta;
        let min2 = min_distance * min_distance;
        let mut stack = vec![0usize];

        while let Some(index) = stack.pop() {
            let cell = &self.cells[index];
            if cell.mass == 0.0 {
                continue;
            }

            if cell.is_leaf() {
                for &other in &cell.bodies {
                    if other == body {
                        continue;
                    }
                    let mut delta = positions[other] - p;
                    if delta == DVec3::ZERO {
                        delta = jiggle(body, other);
                    }
                    acc += delta / delta.length_squared().max(min2);
                }
                continue;
            }

            let delta = cell.center_of_mass - p;
            let l2 = delta.length_squared();
            let width = cell.half * 2.0;
            if !cell.contains(p) && width * width < theta2 * l2 {
                acc += delta * cell.mass / l2.max(min2);
            } else {
                stack.extend(cell.children.iter().filter(|&&c| c != NONE).map(|&c| c as usize));
            }
        }

        acc
    }
}
