//! Bubble Live State
//!
//! Client-side, single-writer view of one collaborative space.
//!
//! # Architecture
//!
//! - **Reconciler**: merges bulk load, local optimistic mutations and remote
//!   change events into one deduplicated snapshot
//! - **Snapshot**: copy-on-write `Arc<SpaceSnapshot>` readers can hold onto
//! - **Events**: tagged wire events validated at the boundary
//! - **Presence**: roster of other viewers in the space
//!
//! The reconciler never blocks and never performs I/O. Persistence happens
//! through [`Dispatch`] records the caller drains and reports back on.
//!
//! # Usage
//!
//! ```ignore
//! let mut reconciler = Reconciler::default();
//! reconciler.bulk_load(records, placements, relations);
//!
//! // subscription callback
//! reconciler.enqueue_raw(token, payload)?;
//!
//! // once per frame
//! reconciler.drain_remote();
//! let snapshot = reconciler.snapshot();
//! ```

mod config;
mod error;
mod event;
mod model;
mod mutation;
mod presence;
mod reconciler;
mod snapshot;

pub use config::ReconcilerConfig;
pub use error::{Error, Result};
pub use event::{
    EntityEvent, EventKind, EventTarget, PlacementEvent, PlacementRef, RelationEvent, RemoteEvent,
    WireEvent,
};
pub use model::{now_ms, Entity, EntityId, EntityRecord, Placement, Relation, RelationKind, Timestamp};
pub use mutation::{Applied, Dispatch, DispatchFailure, DispatchId, LocalMutation};
pub use presence::{PresenceRoster, Viewer, ViewerPosition};
pub use reconciler::{DrainReport, MergeOutcome, Reconciler, SessionToken};
pub use snapshot::SpaceSnapshot;
