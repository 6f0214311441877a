//! Pub/sub side of the boundary.
//!
//! The subscription collaborator pushes raw change payloads into a bounded
//! channel from any task. The session pulls them once per frame without
//! awaiting.

use bubble_state::{Error as StateError, Reconciler, SessionToken};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle held by the subscription callback.
pub type FeedSender = mpsc::Sender<Value>;

/// Counts from one [`RemoteFeed::drain_into`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedReport {
    /// Payloads accepted into the reconciler inbox.
    pub accepted: usize,
    /// Payloads dropped as malformed.
    pub malformed: usize,
    /// Payloads refused because the session token was stale.
    pub stale: usize,
}

/// Receiving half of the remote change feed.
#[derive(Debug)]
pub struct RemoteFeed {
    rx: mpsc::Receiver<Value>,
    closed: bool,
}

impl RemoteFeed {
    /// Create a feed with room for `capacity` in-flight payloads.
    pub fn channel(capacity: usize) -> (FeedSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, closed: false })
    }

    /// Move pending payloads into the reconciler inbox.
    ///
    /// Stops early when the inbox is full so the rest stay in the channel and
    /// publishers feel backpressure instead of triggering a resync.
    pub fn drain_into(&mut self, reconciler: &mut Reconciler, token: SessionToken) -> FeedReport {
        let mut report = FeedReport::default();
        if self.closed {
            return report;
        }

        let capacity = reconciler.config().inbox_capacity;
        while reconciler.inbox_len() < capacity {
            let value = match self.rx.try_recv() {
                Ok(value) => value,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("remote feed disconnected");
                    self.closed = true;
                    break;
                }
            };

            match reconciler.enqueue_raw(token, value) {
                Ok(()) => report.accepted += 1,
                Err(StateError::StaleSession { .. }) => report.stale += 1,
                Err(StateError::InboxFull(_)) => break,
                Err(_) => report.malformed += 1,
            }
        }

        if report.stale > 0 {
            warn!(count = report.stale, "dropped events for a previous session");
        }
        report
    }

    /// Stop accepting payloads. Anything still buffered is discarded.
    pub fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.closed = true;
    }

    /// True once every sender is gone or [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
