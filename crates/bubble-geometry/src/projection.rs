//! Projections between simulation space and render space.
//!
//! The isometric projection rotates the simulation plane 45 degrees and
//! squashes it vertically:
//!
//! ```text
//! sx = (x - y) * cos(30°) + width / 2
//! sy = (x + y) * sin(30°) + height / 2
//! ```
//!
//! The linear part has determinant `2 * cos(30°) * sin(30°) != 0`, so the
//! mapping is a bijection and `unproject` is its exact inverse.

use glam::{DVec2, DVec3};

use crate::error::{Error, Result};
use crate::{DEFAULT_TILE_SIZE, ISO_ANGLE};

/// A point in screen (pixel) space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Mapping between simulation coordinates and a render coordinate system.
///
/// Implementations must be pure: the same input always yields the same output.
pub trait Projection {
    /// Render-side coordinate type.
    type Output;

    /// Simulation coordinates to render coordinates.
    fn project(&self, x: f64, y: f64) -> Self::Output;

    /// Render coordinates back to simulation coordinates.
    fn unproject(&self, point: Self::Output) -> DVec2;
}

/// Isometric 2.5D projection centred in a viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Isometric {
    width: f64,
    height: f64,
    tile_size: f64,
}

impl Isometric {
    /// Create a projection for a viewport of the given size.
    pub fn new(width: f64, height: f64) -> Result<Self> {
        Self::with_tile_size(width, height, DEFAULT_TILE_SIZE)
    }

    /// Create a projection with an explicit tile size.
    pub fn with_tile_size(width: f64, height: f64, tile_size: f64) -> Result<Self> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(Error::InvalidViewport { width, height });
        }
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(Error::InvalidTileSize(tile_size));
        }
        Ok(Self {
            width,
            height,
            tile_size,
        })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Viewport centre in screen space (where the simulation origin lands).
    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.width / 2.0, self.height / 2.0)
    }

    /// Top-left corner of a tile centred on the projected point.
    pub fn tile_origin(&self, x: f64, y: f64) -> ScreenPoint {
        let p = self.project(x, y);
        let half = self.tile_size / 2.0;
        ScreenPoint::new(p.x - half, p.y - half)
    }

    /// Inverse of [`Isometric::tile_origin`].
    pub fn from_tile_origin(&self, origin: ScreenPoint) -> DVec2 {
        let half = self.tile_size / 2.0;
        self.unproject(ScreenPoint::new(origin.x + half, origin.y + half))
    }
}

impl Projection for Isometric {
    type Output = ScreenPoint;

    #[inline]
    fn project(&self, x: f64, y: f64) -> ScreenPoint {
        let iso_x = (x - y) * ISO_ANGLE.cos();
        let iso_y = (x + y) * ISO_ANGLE.sin();
        ScreenPoint::new(iso_x + self.width / 2.0, iso_y + self.height / 2.0)
    }

    #[inline]
    fn unproject(&self, point: ScreenPoint) -> DVec2 {
        let diff = (point.x - self.width / 2.0) / ISO_ANGLE.cos(); // x - y
        let sum = (point.y - self.height / 2.0) / ISO_ANGLE.sin(); // x + y
        DVec2::new((sum + diff) / 2.0, (sum - diff) / 2.0)
    }
}

/// Flat mapping of 2D simulation output onto the XZ ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroundPlane {
    /// World-space height of the plane.
    pub height: f64,
}

impl Projection for GroundPlane {
    type Output = DVec3;

    #[inline]
    fn project(&self, x: f64, y: f64) -> DVec3 {
        DVec3::new(x, self.height, y)
    }

    #[inline]
    fn unproject(&self, point: DVec3) -> DVec2 {
        DVec2::new(point.x, point.z)
    }
}

/// Place a 2D simulation point on the ground plane (y = 0).
#[inline]
pub fn ground_plane(x: f64, y: f64) -> DVec3 {
    GroundPlane::default().project(x, y)
}

/// Recover the simulation point from a ground-plane position.
#[inline]
pub fn from_ground(point: DVec3) -> DVec2 {
    GroundPlane::default().unproject(point)
}
