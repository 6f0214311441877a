//! Error types for bubble-layout.

use thiserror::Error;

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur configuring a layout.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A force parameter is outside its valid range.
    #[error("invalid force parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Layer size must be at least one.
    #[error("layer size must be at least 1")]
    EmptyLayerSize,

    /// Requested layer does not exist.
    #[error("layer {requested} out of range (have {available})")]
    LayerOutOfRange { requested: usize, available: usize },
}
