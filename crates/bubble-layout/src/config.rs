//! Force and simulation parameters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of spatial axes the simulation moves entities along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimensions {
    /// Flat layout; z stays at zero.
    #[default]
    Two,
    /// Full 3D layout.
    Three,
}

impl Dimensions {
    pub fn is_3d(self) -> bool {
        matches!(self, Dimensions::Three)
    }
}

/// Parameters for every force in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Many-body strength. Negative values repel.
    pub charge_strength: f64,
    /// Floor applied to every pairwise distance before inverse-square terms.
    pub min_distance: f64,
    /// Barnes–Hut opening angle.
    pub theta: f64,
    /// Entity count above which repulsion is approximated with an octree.
    pub barnes_hut_threshold: usize,

    /// Rest length of a link spring.
    pub link_distance: f64,
    /// Spring stiffness of a link.
    pub link_strength: f64,

    /// Collision radius of a weight-zero entity.
    pub collide_radius: f64,
    /// Fraction of an overlap resolved per pass (0..=1).
    pub collide_strength: f64,
    /// Radius growth per unit of weight, as a multiple of the base radius.
    pub radius_growth: f64,
    /// Cap on the radius multiplier so outliers do not dominate.
    pub max_radius_scale: f64,

    /// Mean-shift centering strength (0 disables).
    pub center_strength: f64,
    /// Positional pull toward the origin.
    pub gravity: f64,

    /// Fraction of velocity lost per tick. Strictly between 0 and 1.
    pub velocity_decay: f64,
    /// Alpha on (re)start.
    pub alpha_start: f64,
    /// Geometric alpha decay per tick.
    pub alpha_decay: f64,
    /// Alpha below which the layout is settled.
    pub alpha_min: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self::network()
    }
}

impl ForceConfig {
    /// Ground-plane beacon view.
    pub fn network() -> Self {
        Self {
            charge_strength: -200.0,
            min_distance: 1.0,
            theta: 0.9,
            barnes_hut_threshold: 64,
            link_distance: 30.0,
            link_strength: 0.3,
            collide_radius: 8.0,
            collide_strength: 1.0,
            radius_growth: 0.15,
            max_radius_scale: 2.5,
            center_strength: 1.0,
            gravity: 0.03,
            velocity_decay: 0.4,
            alpha_start: 1.0,
            alpha_decay: 0.02,
            alpha_min: 0.001,
        }
    }

    /// Isometric tile view, spaced for tiles of `tile_size` pixels.
    pub fn isometric(tile_size: f64) -> Self {
        Self {
            charge_strength: -800.0,
            link_distance: tile_size * 3.0,
            link_strength: 0.2,
            collide_radius: tile_size * 1.4,
            radius_growth: 0.0,
            velocity_decay: 0.3,
            ..Self::network()
        }
    }

    /// Collision radius for an entity of the given weight.
    pub fn radius_for(&self, weight: f64) -> f64 {
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        let scale = (1.0 + self.radius_growth * weight).min(self.max_radius_scale);
        self.collide_radius * scale.max(1.0)
    }

    /// Number of ticks from `alpha_start` until settled.
    pub fn ticks_to_settle(&self) -> usize {
        if self.alpha_start <= self.alpha_min {
            return 0;
        }
        ((self.alpha_min / self.alpha_start).ln() / (1.0 - self.alpha_decay).ln()).ceil() as usize
    }

    /// Check every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        fn check(name: &'static str, value: f64, ok: bool) -> Result<()> {
            if value.is_finite() && ok {
                Ok(())
            } else {
                Err(Error::InvalidParameter { name, value })
            }
        }

        check("charge_strength", self.charge_strength, true)?;
        check("min_distance", self.min_distance, self.min_distance > 0.0)?;
        check("theta", self.theta, self.theta >= 0.0)?;
        check("link_distance", self.link_distance, self.link_distance >= 0.0)?;
        check("link_strength", self.link_strength, self.link_strength >= 0.0)?;
        check("collide_radius", self.collide_radius, self.collide_radius >= 0.0)?;
        check(
            "collide_strength",
            self.collide_strength,
            (0.0..=1.0).contains(&self.collide_strength),
        )?;
        check("radius_growth", self.radius_growth, self.radius_growth >= 0.0)?;
        check("max_radius_scale", self.max_radius_scale, self.max_radius_scale >= 1.0)?;
        check("center_strength", self.center_strength, self.center_strength >= 0.0)?;
        check("gravity", self.gravity, self.gravity >= 0.0)?;
        check(
            "velocity_decay",
            self.velocity_decay,
            self.velocity_decay > 0.0 && self.velocity_decay < 1.0,
        )?;
        check("alpha_start", self.alpha_start, self.alpha_start > 0.0)?;
        check(
            "alpha_decay",
            self.alpha_decay,
            self.alpha_decay > 0.0 && self.alpha_decay < 1.0,
        )?;
        check("alpha_min", self.alpha_min, self.alpha_min > 0.0)?;
        Ok(())
    }
}

/// Configuration for a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub forces: ForceConfig,
    pub dimensions: Dimensions,
    /// Seed for initial placement. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Default forces with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn with_forces(mut self, forces: ForceConfig) -> Self {
        self.forces = forces;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ForceConfig::default().validate().is_ok());
        assert!(ForceConfig::isometric(80.0).validate().is_ok());
    }

    #[test]
    fn velocity_decay_must_be_open_interval() {
        for bad in [0.0, 1.0, -0.1, f64::NAN] {
            let config = ForceConfig {
                velocity_decay: bad,
                ..ForceConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidParameter { name: "velocity_decay", .. })
            ));
        }
    }

    #[test]
    fn radius_grows_with_weight_up_to_cap() {
        let config = ForceConfig::default();
        assert_eq!(config.radius_for(0.0), 8.0);
        assert!((config.radius_for(2.0) - 8.0 * 1.3).abs() < 1e-12);
        assert_eq!(config.radius_for(1_000.0), 8.0 * 2.5);
        assert_eq!(config.radius_for(f64::INFINITY), 8.0);
        assert_eq!(config.radius_for(-5.0), 8.0);
    }

    #[test]
    fn isometric_preset_scales_with_tile() {
        let config = ForceConfig::isometric(80.0);
        assert_eq!(config.link_distance, 240.0);
        assert_eq!(config.collide_radius, 112.0);
        assert_eq!(config.charge_strength, -800.0);
    }

    #[test]
    fn settle_tick_budget_is_bounded() {
        let ticks = ForceConfig::default().ticks_to_settle();
        // ln(0.001) / ln(0.98)
        assert_eq!(ticks, 342);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"dimensions":"three","forces":{"gravity":0.1}}"#).unwrap();
        assert_eq!(config.dimensions, Dimensions::Three);
        assert_eq!(config.forces.gravity, 0.1);
        assert_eq!(config.forces.link_distance, 30.0);
        assert_eq!(config.seed, None);
    }
}
