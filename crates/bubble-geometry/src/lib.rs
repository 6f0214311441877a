//! Bubble Geometry
//!
//! Pure coordinate helpers shared by the layout simulator and the render layer.
//!
//! # Coordinate Systems
//!
//! - **Simulation space**: abstract 2D (or 3D) coordinates produced by the
//!   force simulation, centred on the origin.
//! - **Ground plane**: 3D world space where 2D simulation output lies flat on
//!   the XZ plane (simulation `y` becomes world `z`).
//! - **Screen space**: pixel coordinates of an isometric 2.5D view, origin at
//!   the top-left of the viewport.
//!
//! Every projection here is deterministic and invertible so that hit-testing
//! agrees with the last rendered frame.

mod arrange;
mod error;
mod projection;

pub use arrange::{random_in_shell, Arrangement, SHELL_HEIGHT_OFFSET, SHELL_MAX_RADIUS, SHELL_MIN_RADIUS};
pub use error::{Error, Result};
pub use projection::{from_ground, ground_plane, GroundPlane, Isometric, Projection, ScreenPoint};

pub use glam::{DVec2, DVec3};

/// Isometric axis angle (30 degrees).
pub const ISO_ANGLE: f64 = std::f64::consts::FRAC_PI_6;

/// Default isometric tile size in pixels.
pub const DEFAULT_TILE_SIZE: f64 = 80.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_angle_is_thirty_degrees() {
        assert!((ISO_ANGLE.to_degrees() - 30.0).abs() < 1e-12);
    }
}
