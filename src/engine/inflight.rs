//! In-flight operation table for peer-initiated requests.
//!
//! One entry per currently-handled peer request. Entries are created when the
//! handler task is dispatched and removed when it finishes. The cancel path
//! and the completion path each take the table lock exactly once, so an
//! acknowledgment always reflects a consistent `found`/`already_completed`
//! observation.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// State tracked for one peer-initiated request being handled.
#[derive(Debug)]
pub struct InFlightOperation {
    /// Request kind, kept for diagnostics.
    pub subtype: String,
    /// Trigger requesting cooperative cancellation of the handler.
    pub cancel: CancellationToken,
    /// When the handler task was dispatched.
    pub started_at: Instant,
    /// Set when the handler finished or a cancellation was already
    /// delivered; a later cancel notice acknowledges `already_completed`
    /// without re-firing the trigger.
    pub completed: bool,
}

/// What a cancellation notice observed at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelObservation {
    /// Whether the operation was present in the table.
    pub found: bool,
    /// Whether the operation was already marked completed.
    pub already_completed: bool,
}

/// Table of in-flight peer-initiated operations keyed by request id.
///
/// Owned by one engine instance; never shared between engines.
#[derive(Debug, Default)]
pub struct InFlightTable {
    entries: Mutex<HashMap<String, InFlightOperation>>,
}

impl InFlightTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly dispatched operation.
    pub async fn insert(&self, request_id: &str, subtype: &str, cancel: CancellationToken) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            request_id.to_owned(),
            InFlightOperation {
                subtype: subtype.to_owned(),
                cancel,
                started_at: Instant::now(),
                completed: false,
            },
        );
        debug!(request_id, subtype, in_flight = entries.len(), "operation dispatched");
    }

    /// Mark an operation completed and remove it.
    ///
    /// The flag is set before removal inside one critical section, so a
    /// racing cancellation notice observes either a live entry or nothing,
    /// never a torn state. Returns the removed entry, if any.
    pub async fn finish(&self, request_id: &str) -> Option<InFlightOperation> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(request_id) {
            entry.completed = true;
        }
        entries.remove(request_id)
    }

    /// Fire the cancellation trigger for an operation, if it is still live.
    ///
    /// The first notice fires the trigger and marks the entry completed;
    /// firing an already-fired trigger is a no-op, and repeat notices
    /// acknowledge `already_completed` instead. The whole step holds the
    /// table lock once.
    pub async fn cancel(&self, request_id: &str) -> CancelObservation {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(request_id) {
            None => CancelObservation {
                found: false,
                already_completed: false,
            },
            Some(entry) => {
                let already_completed = entry.completed;
                if !already_completed {
                    entry.cancel.cancel();
                    entry.completed = true;
                    debug!(
                        request_id,
                        subtype = entry.subtype.as_str(),
                        elapsed = ?entry.started_at.elapsed(),
                        "cancellation trigger fired"
                    );
                }
                CancelObservation {
                    found: true,
                    already_completed,
                }
            }
        }
    }

    /// Fire every live operation's cancellation trigger (engine stop).
    pub async fn cancel_all(&self) {
        let mut entries = self.entries.lock().await;
        for (request_id, entry) in entries.iter_mut() {
            if !entry.completed {
                debug!(request_id = request_id.as_str(), "cancelling in-flight operation for shutdown");
                entry.cancel.cancel();
                entry.completed = true;
            }
        }
    }

    /// Number of operations currently in flight.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no operation is currently in flight.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
