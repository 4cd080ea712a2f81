//! Pending-request table for locally-initiated control requests.
//!
//! One entry per sent request, created on send and removed on the first of:
//! response arrival, deadline elapse, caller cancellation, or engine stop.
//! The slot is a deliver-once handoff: the read loop takes the entry and its
//! `oneshot` sender out of the table in a single critical section, so a
//! duplicate or late response finds no entry and is dropped by the caller.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::protocol::ResponseBody;
use crate::{AppError, Result};

/// State held while a sent request awaits its correlated response.
#[derive(Debug)]
pub struct PendingRequest {
    /// Request kind, kept for diagnostics.
    pub subtype: String,
    /// Deliver-once handoff to the waiting sender.
    pub slot: oneshot::Sender<ResponseBody>,
    /// Per-call timeout the waiting sender races against.
    pub timeout: Duration,
}

/// Table of pending sent requests keyed by request id.
///
/// Owned by one engine instance; never shared between engines.
#[derive(Debug)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, PendingRequest>>,
    capacity: usize,
}

impl PendingTable {
    /// Create an empty table refusing more than `capacity` simultaneous
    /// entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Register a pending entry and return the receiving half of its slot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the table already holds the
    /// capacity limit of pending requests.
    pub async fn register(
        &self,
        request_id: &str,
        subtype: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<ResponseBody>> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            return Err(AppError::Protocol(format!(
                "too many pending control requests (limit {})",
                self.capacity
            )));
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            request_id.to_owned(),
            PendingRequest {
                subtype: subtype.to_owned(),
                slot: tx,
                timeout,
            },
        );
        debug!(request_id, subtype, pending = entries.len(), "pending request registered");
        Ok(rx)
    }

    /// Look up and remove the entry for an arriving response.
    ///
    /// Lookup and removal happen under one lock so a racing timeout or
    /// cancellation path can never observe a half-removed entry. Returns
    /// `None` when no entry matches (late or duplicate response).
    pub async fn complete(&self, request_id: &str) -> Option<PendingRequest> {
        self.entries.lock().await.remove(request_id)
    }

    /// Remove an entry whose waiter gave up (timeout, cancellation, stop).
    ///
    /// Returns whether an entry was present.
    pub async fn remove(&self, request_id: &str) -> bool {
        self.entries.lock().await.remove(request_id).is_some()
    }

    /// Request ids currently awaiting responses, sorted (diagnostics).
    pub async fn request_ids(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of entries currently pending.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no request is currently pending.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
