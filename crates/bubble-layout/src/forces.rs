//! Force kernels.
//!
//! Every kernel adds to body velocities; positions are only written by
//! integration, centering and the overlap pass. All inverse-distance terms go
//! through a minimum-distance floor so coincident bodies cannot produce
//! non-finite values.

use std::collections::HashMap;
use std::f64::consts::TAU;

use glam::DVec3;

use crate::octree::Octree;

/// Magnitude of the separation vector used for coincident bodies.
const JIGGLE: f64 = 1e-6;

/// Simulation-internal state of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Body {
    pub position: DVec3,
    pub velocity: DVec3,
    pub radius: f64,
    pub pinned: bool,
}

/// A link with endpoints resolved to body indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Spring {
    pub source: usize,
    pub target: usize,
    pub distance: f64,
    pub strength: f64,
    /// Share of the correction applied to the target.
    pub bias: f64,
}

/// Deterministic tiny offset for two bodies at identical coordinates.
pub(crate) fn jiggle(a: usize, b: usize) -> DVec3 {
    let angle = (a as f64 * 2.399_963_229_7 + b as f64 * 0.618_033_988_7) % TAU;
    DVec3::new(angle.cos(), angle.sin(), 0.0) * JIGGLE
}

/// Exact pairwise repulsion. O(n²).
pub(crate) fn many_body_exact(bodies: &mut [Body], strength: f64, alpha: f64, min_distance: f64) {
    let min2 = min_distance * min_distance;
    let n = bodies.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let mut delta = bodies[j].position - bodies[i].position;
            if delta == DVec3::ZERO {
                delta = jiggle(i, j);
            }
            let w = strength * alpha / delta.length_squared().max(min2);
            bodies[i].velocity += delta * w;
            bodies[j].velocity -= delta * w;
        }
    }
}

/// Barnes–Hut approximated repulsion. O(n log n).
pub(crate) fn many_body_approx(
    bodies: &mut [Body],
    strength: f64,
    alpha: f64,
    min_distance: f64,
    theta: f64,
) {
    let positions: Vec<DVec3> = bodies.iter().map(|b| b.position).collect();
    let tree = Octree::build(&positions);
    for (i, body) in bodies.iter_mut().enumerate() {
        body.velocity += tree.field_at(i, &positions, theta, min_distance) * strength * alpha;
    }
}

/// Spring force toward each link's rest length.
pub(crate) fn links(bodies: &mut [Body], springs: &[Spring], alpha: f64) {
    for (k, spring) in springs.iter().enumerate() {
        let (s, t) = (spring.source, spring.target);
        if s == t {
            continue;
        }
        let mut delta = (bodies[t].position + bodies[t].velocity)
            - (bodies[s].position + bodies[s].velocity);
        if delta == DVec3::ZERO {
            delta = jiggle(k, s ^ t);
        }
        let l = delta.length();
        let correction = delta * ((l - spring.distance) / l * alpha * spring.strength);

        let bias = match (bodies[s].pinned, bodies[t].pinned) {
            (true, false) => 1.0,
            (false, true) => 0.0,
            _ => spring.bias,
        };
        bodies[t].velocity -= correction * bias;
        bodies[s].velocity += correction * (1.0 - bias);
    }
}

/// Velocity-level collision response on predicted positions.
pub(crate) fn collide(bodies: &mut [Body], pairs: &[(usize, usize)], strength: f64) {
    for &(i, j) in pairs {
        let ri = bodies[i].radius;
        let rj = bodies[j].radius;
        let r = ri + rj;
        let mut delta = (bodies[i].position + bodies[i].velocity)
            - (bodies[j].position + bodies[j].velocity);
        let mut l2 = delta.length_squared();
        if l2 >= r * r {
            continue;
        }
        if l2 == 0.0 {
            delta = jiggle(i, j);
            l2 = delta.length_squared();
        }
        let l = l2.sqrt();
        let push = delta * ((r - l) / l * strength);
        let (share_i, share_j) = shares(&bodies[i], &bodies[j]);
        bodies[i].velocity += push * share_i;
        bodies[j].velocity -= push * share_j;
    }
}

/// Positional overlap resolution; returns the largest overlap seen.
pub(crate) fn separate(bodies: &mut [Body], pairs: &[(usize, usize)]) -> f64 {
    let mut worst = 0.0f64;
    for &(i, j) in pairs {
        let r = bodies[i].radius + bodies[j].radius;
        let mut delta = bodies[i].position - bodies[j].position;
        let mut l2 = delta.length_squared();
        if l2 >= r * r {
            continue;
        }
        if l2 == 0.0 {
            delta = jiggle(i, j);
            l2 = delta.length_squared();
        }
        let l = l2.sqrt();
        worst = worst.max(r - l);
        let push = delta * ((r - l) / l);
        let (share_i, share_j) = shares(&bodies[i], &bodies[j]);
        bodies[i].position += push * share_i;
        bodies[j].position -= push * share_j;
    }
    worst
}

/// How a correction splits between two bodies: larger bodies move less,
/// pinned bodies do not move at all.
fn shares(a: &Body, b: &Body) -> (f64, f64) {
    match (a.pinned, b.pinned) {
        (true, true) => (0.0, 0.0),
        (true, false) => (0.0, 1.0),
        (false, true) => (1.0, 0.0),
        (false, false) => {
            let (ra2, rb2) = (a.radius * a.radius, b.radius * b.radius);
            let total = ra2 + rb2;
            if total == 0.0 {
                (0.5, 0.5)
            } else {
                (rb2 / total, ra2 / total)
            }
        }
    }
}

/// Shift free bodies so their centroid sits at the origin.
pub(crate) fn center(bodies: &mut [Body], strength: f64) {
    let free: Vec<usize> = (0..bodies.len()).filter(|&i| !bodies[i].pinned).collect();
    if free.is_empty() || strength == 0.0 {
        return;
    }
    let mean = free.iter().map(|&i| bodies[i].position).sum::<DVec3>() / free.len() as f64;
    let shift = mean * strength;
    for i in free {
        bodies[i].position -= shift;
    }
}

/// Weak positional pull toward the origin.
pub(crate) fn gravity(bodies: &mut [Body], strength: f64, alpha: f64) {
    for body in bodies.iter_mut() {
        body.velocity -= body.position * (strength * alpha);
    }
}

/// Pairs of bodies close enough to collide.
///
/// Small sets check every pair; larger sets bucket bodies into a uniform grid
/// with cells as wide as the largest possible contact distance.
pub(crate) fn contact_pairs(bodies: &[Body], grid_threshold: usize) -> Vec<(usize, usize)> {
    let n = bodies.len();
    if n <= grid_threshold {
        return (0..n).flat_map(|i| ((i + 1)..n).map(move |j| (i, j))).collect();
    }

    let max_radius = bodies.iter().map(|b| b.radius).fold(0.0f64, f64::max);
    let cell = (max_radius * 2.0).max(1.0);
    let key = |p: DVec3| {
        let c = (p / cell).floor();
        (c.x as i64, c.y as i64, c.z as i64)
    };

    let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
    for (i, body) in bodies.iter().enumerate() {
        grid.entry(key(body.position + body.velocity)).or_default().push(i);
    }

    let mut pairs = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        let (x, y, z) = key(body.position + body.velocity);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(cell_bodies) = grid.get(&(x + dx, y + dy, z + dz)) {
                        pairs.extend(cell_bodies.iter().filter(|&&j| j > i).map(|&j| (i, j)));
                    }
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f64, y: f64) -> Body {
        Body {
            position: DVec3::new(x, y, 0.0),
            velocity: DVec3::ZERO,
            radius: 5.0,
            pinned: false,
        }
    }

    #[test]
    fn repulsion_pushes_apart() {
        let mut bodies = vec![body(0.0, 0.0), body(10.0, 0.0)];
        many_body_exact(&mut bodies, -100.0, 1.0, 1.0);
        assert!(bodies[0].velocity.x < 0.0);
        assert!(bodies[1].velocity.x > 0.0);
        assert_eq!(bodies[0].velocity, -bodies[1].velocity);
    }

    #[test]
    fn coincident_bodies_stay_finite() {
        let mut bodies = vec![body(3.0, 3.0), body(3.0, 3.0), body(3.0, 3.0)];
        many_body_exact(&mut bodies, -200.0, 1.0, 1.0);
        many_body_approx(&mut bodies, -200.0, 1.0, 1.0, 0.9);
        let pairs = contact_pairs(&bodies, 64);
        collide(&mut bodies, &pairs, 1.0);
        separate(&mut bodies, &pairs);
        for b in &bodies {
            assert!(b.position.is_finite());
            assert!(b.velocity.is_finite());
        }
        assert_ne!(bodies[0].position, bodies[1].position);
    }

    #[test]
    fn spring_pulls_toward_rest_length() {
        let mut bodies = vec![body(0.0, 0.0), body(100.0, 0.0)];
        let spring = Spring {
            source: 0,
            target: 1,
            distance: 30.0,
            strength: 0.5,
            bias: 0.5,
        };
        links(&mut bodies, &[spring], 1.0);
        assert!(bodies[0].velocity.x > 0.0);
        assert!(bodies[1].velocity.x < 0.0);
    }

    #[test]
    fn spring_pushes_when_compressed() {
        let mut bodies = vec![body(0.0, 0.0), body(5.0, 0.0)];
        let spring = Spring {
            source: 0,
            target: 1,
            distance: 30.0,
            strength: 0.5,
            bias: 0.5,
        };
        links(&mut bodies, &[spring], 1.0);
        assert!(bodies[0].velocity.x < 0.0);
        assert!(bodies[1].velocity.x > 0.0);
    }

    #[test]
    fn separate_removes_overlap() {
        let mut bodies = vec![body(0.0, 0.0), body(4.0, 0.0)];
        let pairs = contact_pairs(&bodies, 64);
        let worst = separate(&mut bodies, &pairs);
        assert!((worst - 6.0).abs() < 1e-12);
        let d = bodies[0].position.distance(bodies[1].position);
        assert!((d - 10.0).abs() < 1e-9);
    }

    #[test]
    fn pinned_body_does_not_move_in_separation() {
        let mut bodies = vec![body(0.0, 0.0), body(4.0, 0.0)];
        bodies[0].pinned = true;
        let pairs = contact_pairs(&bodies, 64);
        separate(&mut bodies, &pairs);
        assert_eq!(bodies[0].position, DVec3::ZERO);
        assert!((bodies[1].position.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn center_moves_centroid_to_origin() {
        let mut bodies = vec![body(10.0, 10.0), body(20.0, 10.0)];
        center(&mut bodies, 1.0);
        let mean = (bodies[0].position + bodies[1].position) / 2.0;
        assert!(mean.length() < 1e-12);
    }

    #[test]
    fn gravity_points_home() {
        let mut bodies = vec![body(10.0, -10.0)];
        gravity(&mut bodies, 0.1, 1.0);
        assert!(bodies[0].velocity.x < 0.0);
        assert!(bodies[0].velocity.y > 0.0);
    }

    #[test]
    fn grid_pairs_match_brute_force_for_contacts() {
        let bodies: Vec<Body> = (0..100)
            .map(|i| body((i % 10) as f64 * 7.0, (i / 10) as f64 * 7.0))
            .collect();
        let brute = contact_pairs(&bodies, usize::MAX);
        let gridded = contact_pairs(&bodies, 0);

        let touching = |pairs: &[(usize, usize)]| {
            let mut v: Vec<_> = pairs
                .iter()
                .copied()
                .filter(|&(i, j)| bodies[i].position.distance(bodies[j].position) < 10.0)
                .collect();
            v.sort_unstable();
            v
        };
        assert_eq!(touching(&brute), touching(&gridded));
    }
}
