//! Bubble Sync
//!
//! The async boundary around the synchronous layout and state crates.
//!
//! # Architecture
//!
//! - **RemoteFeed**: bounded channel the pub/sub subscription pushes raw
//!   change payloads into; drained with `try_recv` once per frame
//! - **Dispatcher**: runs each local mutation against a [`PersistenceSink`]
//!   on its own task and reports outcomes back on the next frame
//! - **SpaceSession**: owns the reconciler, layers and simulation and
//!   advances all of them from [`SpaceSession::frame`]
//!
//! Nothing on the frame path awaits.
//!
//! # Usage
//!
//! ```ignore
//! let (mut session, feed) = SpaceSession::new(SessionConfig::default(), sink, "me")?;
//! session.load(records, placements, relations);
//! subscribe(move |payload| { let _ = feed.try_send(payload); });
//!
//! loop {
//!     let frame = session.frame();
//!     render(&frame);
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod feed;
mod session;

pub use config::{FeedConfig, SessionConfig};
pub use dispatch::{CollectReport, DispatchOutcome, Dispatcher, MemorySink, PersistenceSink};
pub use error::{Error, Result, SinkError};
pub use feed::{FeedReport, FeedSender, RemoteFeed};
pub use session::{Frame, SpaceSession};
