//! Error types for bubble-sync.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur driving a space session.
#[derive(Debug, Error)]
pub enum Error {
    /// Reconciler rejected an operation
    #[error("State error: {0}")]
    State(#[from] bubble_state::Error),

    /// Layout configuration error
    #[error("Layout error: {0}")]
    Layout(#[from] bubble_layout::Error),

    /// Dispatcher used outside a tokio runtime
    #[error("No tokio runtime: {0}")]
    NoRuntime(String),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Failure reported by a persistence collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Backend refused the mutation
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Backend could not be reached
    #[error("Unavailable: {0}")]
    Unavailable(String),
}
