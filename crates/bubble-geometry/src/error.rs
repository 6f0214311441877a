//! Error types for bubble-geometry.

use thiserror::Error;

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building a projection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Viewport dimensions must be finite and positive.
    #[error("invalid viewport {width}x{height}")]
    InvalidViewport { width: f64, height: f64 },

    /// Tile size must be finite and positive.
    #[error("invalid tile size: {0}")]
    InvalidTileSize(f64),
}
