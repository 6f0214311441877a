//! Error types for bubble-state.

use thiserror::Error;

use crate::model::EntityId;

/// Result type for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the reconciler.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote event could not be parsed
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity id already present
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(EntityId),

    /// Entity id not present
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// Relation endpoint not present
    #[error("Relation endpoint missing: {from} -> {to}")]
    MissingEndpoint { from: EntityId, to: EntityId },

    /// Token from a session that was reset
    #[error("Stale session: token generation {token}, current {current}")]
    StaleSession { token: u64, current: u64 },

    /// Remote inbox at capacity; a resync is needed
    #[error("Inbox full ({0} events)")]
    InboxFull(usize),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
