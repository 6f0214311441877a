//! Deterministic arrangements.
//!
//! Used wherever a position is needed without running the physics solver:
//! idle layers, freshly dropped nodes, and seeding the simulation.

use std::f64::consts::{PI, TAU};

use glam::{DVec2, DVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Inner radius of the random placement shell.
pub const SHELL_MIN_RADIUS: f64 = 8.0;

/// Outer radius of the random placement shell.
pub const SHELL_MAX_RADIUS: f64 = 16.0;

/// Vertical lift applied to random shell positions.
pub const SHELL_HEIGHT_OFFSET: f64 = 2.0;

/// A deterministic layout pattern for `total` items.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Arrangement {
    /// Flat ring on the simulation plane.
    Ring { radius: f64 },
    /// Ring around the vertical axis with a gentle height wave.
    Circle { radius: f64 },
    /// Outward spiral climbing as it turns.
    Spiral,
    /// Square grid centred on the origin.
    Grid { spacing: f64 },
    /// Scattered inside the placement shell. Each index draws from its own
    /// stream so positions do not depend on `total`.
    Random { seed: u64 },
}

impl Default for Arrangement {
    fn default() -> Self {
        Arrangement::Circle { radius: 10.0 }
    }
}

impl Arrangement {
    /// Position of item `index` out of `total`.
    ///
    /// `Ring` lies in the simulation plane (z = 0); the others are world-space
    /// positions with y up.
    pub fn position(&self, index: usize, total: usize) -> DVec3 {
        let total = total.max(1);
        let i = index as f64;
        match *self {
            Arrangement::Ring { radius } => ring(index, total, radius).extend(0.0),
            Arrangement::Circle { radius } => {
                let angle = i / total as f64 * TAU;
                DVec3::new(
                    angle.cos() * radius,
                    2.0 + (i * 0.5).sin() * 2.0,
                    angle.sin() * radius,
                )
            }
            Arrangement::Spiral => {
                let angle = i * 0.5;
                let radius = 5.0 + i * 0.3;
                DVec3::new(angle.cos() * radius, i * 0.5, angle.sin() * radius)
            }
            Arrangement::Grid { spacing } => {
                let cols = (total as f64).sqrt().ceil() as usize;
                let row = index / cols;
                let col = index % cols;
                let half = cols as f64 / 2.0;
                DVec3::new(
                    (col as f64 - half) * spacing,
                    2.0,
                    (row as f64 - half) * spacing,
                )
            }
            Arrangement::Random { seed } => {
                let stream = (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
                random_in_shell(&mut StdRng::seed_from_u64(seed ^ stream))
            }
        }
    }

    /// Positions for every item in order.
    pub fn positions(&self, total: usize) -> Vec<DVec3> {
        (0..total).map(|i| self.position(i, total)).collect()
    }
}

/// Evenly spaced point on a flat ring.
pub(crate) fn ring(index: usize, total: usize, radius: f64) -> DVec2 {
    let angle = index as f64 / total.max(1) as f64 * TAU;
    DVec2::new(angle.cos() * radius, angle.sin() * radius)
}

/// Random position inside a spherical shell around the space centre.
pub fn random_in_shell<R: Rng + ?Sized>(rng: &mut R) -> DVec3 {
    let radius = rng.gen_range(SHELL_MIN_RADIUS..SHELL_MAX_RADIUS);
    let theta = rng.gen_range(0.0..TAU);
    let phi = rng.gen_range(0.0..PI);

    DVec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.sin() * theta.sin() + SHELL_HEIGHT_OFFSET,
        radius * phi.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ring_is_flat_and_on_radius() {
        let arrangement = Arrangement::Ring { radius: 50.0 };
        for p in arrangement.positions(7) {
            assert_eq!(p.z, 0.0);
            assert!((p.truncate().length() - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ring_spreads_items_apart() {
        let positions = Arrangement::Ring { radius: 10.0 }.positions(4);
        assert!((positions[0] - DVec3::new(10.0, 0.0, 0.0)).length() < 1e-9);
        assert!((positions[2] - DVec3::new(-10.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn circle_stays_on_horizontal_radius() {
        let arrangement = Arrangement::Circle { radius: 10.0 };
        for p in arrangement.positions(12) {
            let horizontal = DVec2::new(p.x, p.z).length();
            assert!((horizontal - 10.0).abs() < 1e-9);
            assert!(p.y >= 0.0 && p.y <= 4.0);
        }
    }

    #[test]
    fn spiral_climbs() {
        let positions = Arrangement::Spiral.positions(5);
        for pair in positions.windows(2) {
            assert!(pair[1].y > pair[0].y);
        }
    }

    #[test]
    fn grid_uses_square_columns() {
        let positions = Arrangement::Grid { spacing: 3.0 }.positions(9);
        // 3 columns, centred: first cell at (-1.5 * 3, _, -1.5 * 3)
        assert_eq!(positions[0], DVec3::new(-4.5, 2.0, -4.5));
        assert_eq!(positions[4], DVec3::new(-1.5, 2.0, -1.5));
        assert_eq!(positions[8], DVec3::new(1.5, 2.0, 1.5));
    }

    #[test]
    fn zero_total_does_not_divide_by_zero() {
        let p = Arrangement::Ring { radius: 5.0 }.position(0, 0);
        assert!(p.is_finite());
    }

    #[test]
    fn random_shell_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let p = random_in_shell(&mut rng);
            let centred = p - DVec3::new(0.0, SHELL_HEIGHT_OFFSET, 0.0);
            let r = centred.length();
            assert!(r >= SHELL_MIN_RADIUS - 1e-9 && r <= SHELL_MAX_RADIUS + 1e-9);
        }
    }

    #[test]
    fn random_arrangement_is_stable_per_index() {
        let arrangement = Arrangement::Random { seed: 3 };
        let few = arrangement.positions(3);
        let many = arrangement.positions(10);
        assert_eq!(few[..], many[..3]);
        assert_ne!(many[0], many[1]);
        assert_ne!(few[0], Arrangement::Random { seed: 4 }.position(0, 3));

        for p in many {
            let r = (p - DVec3::new(0.0, SHELL_HEIGHT_OFFSET, 0.0)).length();
            assert!(r >= SHELL_MIN_RADIUS - 1e-9 && r <= SHELL_MAX_RADIUS + 1e-9);
        }
    }
}
