//! Persistence side of the boundary.
//!
//! Dispatches are fire-and-forget: each one runs on its own task and its
//! outcome comes back over a channel the session drains on the next frame.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bubble_state::{Dispatch, DispatchId, Reconciler};
use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Error, Result, SinkError};

/// Where local mutations are persisted.
pub trait PersistenceSink: Send + Sync + 'static {
    fn persist(&self, dispatch: Dispatch) -> BoxFuture<'static, std::result::Result<(), SinkError>>;
}

/// Completion report for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub id: DispatchId,
    pub result: std::result::Result<(), SinkError>,
}

/// Counts from one [`Dispatcher::collect`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs dispatches against a [`PersistenceSink`] on the tokio runtime.
pub struct Dispatcher {
    sink: Arc<dyn PersistenceSink>,
    runtime: Handle,
    outcome_tx: mpsc::UnboundedSender<DispatchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<DispatchOutcome>,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher bound to the current tokio runtime.
    pub fn new(sink: Arc<dyn PersistenceSink>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(sink, runtime))
    }

    pub fn with_handle(sink: Arc<dyn PersistenceSink>, runtime: Handle) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            runtime,
            outcome_tx,
            outcome_rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start one task per dispatch. Never waits.
    pub fn send(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            let id = dispatch.id;
            let fut = self.sink.persist(dispatch);
            let tx = self.outcome_tx.clone();
            let in_flight = Arc::clone(&self.in_flight);
            in_flight.fetch_add(1, Ordering::SeqCst);

            trace!(dispatch = %id, "dispatching");
            self.runtime.spawn(async move {
                let result = fut.await;
                // Receiver gone means the session was dropped
                let _ = tx.send(DispatchOutcome { id, result });
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Report every finished dispatch back to the reconciler.
    pub fn collect(&mut self, reconciler: &mut Reconciler) -> CollectReport {
        let mut report = CollectReport::default();
        loop {
            let outcome = match self.outcome_rx.try_recv() {
                Ok(outcome) => outcome,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            };
            match outcome.result {
                Ok(()) => {
                    if reconciler.dispatch_succeeded(outcome.id) {
                        report.succeeded += 1;
                    }
                }
                Err(e) => {
                    if reconciler.dispatch_failed(outcome.id, e.to_string()) {
                        report.failed += 1;
                    }
                }
            }
        }
        if report.succeeded + report.failed > 0 {
            debug!(succeeded = report.succeeded, failed = report.failed, "dispatch outcomes");
        }
        report
    }

    /// Dispatches started but not yet finished.
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// In-memory sink for tests and the demo binary.
///
/// Records every persisted dispatch in order. Failures can be injected for
/// the next `n` calls.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Dispatch>>>,
    fail_next: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` persists fail with [`SinkError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<Dispatch> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl PersistenceSink for MemorySink {
    fn persist(&self, dispatch: Dispatch) -> BoxFuture<'static, std::result::Result<(), SinkError>> {
        let fail = self.take_failure();
        let records = Arc::clone(&self.records);
        async move {
            if fail {
                return Err(SinkError::Unavailable(format!("dispatch {} dropped", dispatch.id)));
            }
            records.lock().await.push(dispatch);
            Ok(())
        }
        .boxed()
    }
}
