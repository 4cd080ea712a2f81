//! Bidirectional control-message correlation engine.
//!
//! The engine owns request-id generation, the pending-request table, the
//! in-flight-operation table, and the handler registry. One background read
//! loop demultiplexes every decoded inbound message:
//!
//! | Classified as            | Routed to                                   |
//! |--------------------------|---------------------------------------------|
//! | `control_response`       | The matching pending request's slot         |
//! | `control_request`        | A handler task tracked as in-flight         |
//! | `control_cancel_request` | The in-flight table's cancellation trigger  |
//! | *(data)*                 | The bounded forwarding queue, arrival order |
//!
//! The read loop is the sole reader of the transport's message stream; all
//! routing happens through the engine's tables. Each table is guarded by its
//! own lock, so `send_request` callers, handler tasks, and the read loop
//! never contend on unrelated operations.

pub mod inflight;
pub mod pending;

pub use inflight::{CancelObservation, InFlightOperation, InFlightTable};
pub use pending::{PendingRequest, PendingTable};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProtocolConfig;
use crate::protocol::{classify, CancelNotice, ControlRequest, InboundMessage, ResponseBody};
use crate::transport::DuplexTransport;
use crate::{AppError, Result};

/// Boxed future returned by a request handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Map<String, Value>>> + Send>>;

/// Caller-supplied logic invoked for one request subtype.
///
/// Receives a cancellation token derived from the engine's stop signal and
/// the full control request. Cancellation is cooperative: a handler that
/// ignores its token runs to completion.
pub type RequestHandler =
    Arc<dyn Fn(CancellationToken, ControlRequest) -> HandlerFuture + Send + Sync>;

/// State shared between the engine façade, the read loop, and handler tasks.
struct EngineShared {
    transport: Arc<dyn DuplexTransport>,
    config: ProtocolConfig,
    pending: PendingTable,
    in_flight: InFlightTable,
    handlers: Mutex<HashMap<String, RequestHandler>>,
    /// First transport failure observed; used to fail every waiter fast.
    fatal: Mutex<Option<AppError>>,
    stop: CancellationToken,
    tracker: TaskTracker,
    next_request_seq: AtomicU64,
}

impl EngineShared {
    /// Mint a fresh request id: a monotonic sequence number for sortability
    /// plus a UUID suffix for engine-lifetime uniqueness.
    fn next_request_id(&self) -> String {
        let seq = self.next_request_seq.fetch_add(1, Ordering::Relaxed);
        format!("req_{seq}_{}", Uuid::new_v4().simple())
    }

    /// Record the engine's fatal error; the first recorded error wins.
    async fn record_fatal(&self, err: AppError) {
        let mut fatal = self.fatal.lock().await;
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    /// The error a waiter receives when the engine stops: the recorded
    /// fatal error if any, otherwise a generic stopped error.
    async fn stop_error(&self) -> AppError {
        match self.fatal.lock().await.clone() {
            Some(err) => err,
            None => AppError::Stopped("engine stopped before a response arrived".into()),
        }
    }
}

/// Correlates sent control requests with their responses and dispatches
/// peer-initiated requests to registered handlers.
pub struct CorrelationEngine {
    shared: Arc<EngineShared>,
    started: Mutex<bool>,
}

impl CorrelationEngine {
    /// Create an engine over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn DuplexTransport>, config: ProtocolConfig) -> Self {
        let shared = EngineShared {
            transport,
            pending: PendingTable::new(config.max_pending_requests),
            in_flight: InFlightTable::new(),
            handlers: Mutex::new(HashMap::new()),
            fatal: Mutex::new(None),
            stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_request_seq: AtomicU64::new(1),
            config,
        };
        Self {
            shared: Arc::new(shared),
            started: Mutex::new(false),
        }
    }

    /// Configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &ProtocolConfig {
        &self.shared.config
    }

    /// Register a handler for a request subtype; the last registration wins.
    pub async fn register_handler<F, Fut>(&self, subtype: &str, handler: F)
    where
        F: Fn(CancellationToken, ControlRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Map<String, Value>>> + Send + 'static,
    {
        let boxed: RequestHandler =
            Arc::new(move |cancel, request| Box::pin(handler(cancel, request)));
        self.shared
            .handlers
            .lock()
            .await
            .insert(subtype.to_owned(), boxed);
    }

    /// Start the background read loop.
    ///
    /// Returns the bounded queue of non-control messages, forwarded in
    /// transport arrival order. The queue closes when the read loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the engine was already started, or
    /// [`AppError::Transport`] if the transport cannot start reading.
    pub async fn start(&self) -> Result<mpsc::Receiver<Value>> {
        let mut started = self.started.lock().await;
        if *started {
            return Err(AppError::Protocol("engine already started".into()));
        }

        let (messages, errors) = self
            .shared
            .transport
            .start_reading(self.shared.stop.child_token())?;
        let (data_tx, data_rx) = mpsc::channel(self.shared.config.message_queue_capacity);

        let shared = Arc::clone(&self.shared);
        self.shared
            .tracker
            .spawn(read_loop(shared, messages, errors, data_tx));

        *started = true;
        Ok(data_rx)
    }

    /// Send a control request and await its correlated response.
    ///
    /// Races four outcomes; the first to occur wins, and every losing path
    /// removes the pending entry so a late response is dropped safely:
    /// response delivery, engine stop, the per-call `timeout`, and
    /// `caller_cancel`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Peer`] — the peer answered with an error response.
    /// - [`AppError::Timeout`] — no response within `timeout`.
    /// - [`AppError::Stopped`] or the recorded fatal [`AppError::Transport`]
    ///   — the engine stopped first.
    /// - [`AppError::Cancelled`] — `caller_cancel` fired first.
    /// - [`AppError::Transport`] — the request could not be written.
    pub async fn send_request(
        &self,
        subtype: &str,
        payload: Map<String, Value>,
        timeout: Duration,
        caller_cancel: &CancellationToken,
    ) -> Result<Option<Map<String, Value>>> {
        let shared = &self.shared;
        if shared.stop.is_cancelled() {
            return Err(shared.stop_error().await);
        }

        let request_id = shared.next_request_id();
        let mut slot = shared.pending.register(&request_id, subtype, timeout).await?;

        let envelope =
            ControlRequest::new(request_id.clone(), subtype.to_owned(), payload).to_wire();
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|err| AppError::Protocol(format!("unserializable request payload: {err}")))?;
        if let Err(err) = shared.transport.send(&bytes).await {
            shared.pending.remove(&request_id).await;
            return Err(err);
        }
        debug!(request_id, subtype, "control request sent");

        tokio::select! {
            biased;

            outcome = &mut slot => match outcome {
                Ok(ResponseBody::Success { response, .. }) => Ok(response),
                Ok(ResponseBody::Error { error, .. }) => Err(AppError::Peer(error)),
                Ok(ResponseBody::CancelAcknowledgment { found, already_completed, .. }) => {
                    let mut ack = Map::new();
                    ack.insert("found".into(), found.into());
                    ack.insert("already_completed".into(), already_completed.into());
                    Ok(Some(ack))
                }
                // Slot dropped without a value: the engine is tearing down.
                Err(_) => {
                    shared.pending.remove(&request_id).await;
                    Err(shared.stop_error().await)
                }
            },

            () = shared.stop.cancelled() => {
                shared.pending.remove(&request_id).await;
                Err(shared.stop_error().await)
            }

            () = caller_cancel.cancelled() => {
                shared.pending.remove(&request_id).await;
                Err(AppError::Cancelled(format!(
                    "control request '{subtype}' cancelled by caller"
                )))
            }

            () = tokio::time::sleep(timeout) => {
                shared.pending.remove(&request_id).await;
                Err(AppError::Timeout(format!(
                    "control request '{subtype}' received no response within {timeout:?}"
                )))
            }
        }
    }

    /// Stop the engine: fire the stop signal, cancel every in-flight
    /// operation, and wait for the read loop and all handler tasks.
    ///
    /// Idempotent; concurrent and repeat calls are safe.
    pub async fn shutdown(&self) {
        self.shared.stop.cancel();
        self.shared.in_flight.cancel_all().await;
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        debug!("correlation engine shut down");
    }

    /// Whether the stop signal has fired.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// The recorded transport failure, if any.
    pub async fn fatal_error(&self) -> Option<AppError> {
        self.shared.fatal.lock().await.clone()
    }

    /// Request ids currently awaiting responses, sorted (diagnostics).
    pub async fn pending_request_ids(&self) -> Vec<String> {
        self.shared.pending.request_ids().await
    }

    /// Number of peer-initiated operations currently in flight.
    pub async fn in_flight_len(&self) -> usize {
        self.shared.in_flight.len().await
    }
}

/// Receive on the transport error stream, parking forever once it closes so
/// the read loop's `select!` arm goes quiet instead of spinning.
async fn recv_error(errors: &mut Option<mpsc::Receiver<AppError>>) -> Option<AppError> {
    match errors {
        Some(rx) => {
            let failure = rx.recv().await;
            if failure.is_none() {
                *errors = None;
            }
            failure
        }
        None => std::future::pending().await,
    }
}

/// Background task demultiplexing every inbound message.
async fn read_loop(
    shared: Arc<EngineShared>,
    mut messages: mpsc::Receiver<Value>,
    errors: mpsc::Receiver<AppError>,
    data_tx: mpsc::Sender<Value>,
) {
    let mut errors = Some(errors);

    loop {
        tokio::select! {
            biased;

            () = shared.stop.cancelled() => {
                debug!("read loop: stop signal received");
                break;
            }

            failure = recv_error(&mut errors) => {
                if let Some(err) = failure {
                    warn!(error = %err, "read loop: transport failure, stopping");
                    shared.record_fatal(err).await;
                    break;
                }
            }

            message = messages.recv() => {
                match message {
                    None => {
                        debug!("read loop: message stream closed");
                        break;
                    }
                    Some(value) => dispatch_message(&shared, value, &data_tx).await,
                }
            }
        }
    }

    // Every exit path releases waiters and closes the data queue.
    shared.stop.cancel();
    drop(data_tx);
}

/// Classify one inbound message and route it.
async fn dispatch_message(shared: &Arc<EngineShared>, value: Value, data_tx: &mpsc::Sender<Value>) {
    match classify(value) {
        Err(err) => {
            warn!(error = %err, "read loop: dropping malformed control message");
        }
        Ok(InboundMessage::Response(body)) => deliver_response(shared, body).await,
        Ok(InboundMessage::Request(request)) => dispatch_request(shared, request).await,
        Ok(InboundMessage::Cancel(notice)) => handle_cancel(shared, notice).await,
        Ok(InboundMessage::Data(value)) => {
            // A full queue must not wedge the loop past a stop request.
            tokio::select! {
                biased;

                () = shared.stop.cancelled() => {
                    debug!("read loop: stopping while forwarding data");
                }

                sent = data_tx.send(value) => {
                    if sent.is_err() {
                        debug!("read loop: data consumer dropped, discarding message");
                    }
                }
            }
        }
    }
}

/// Deliver a response to its pending request's slot.
///
/// Lookup and removal are one critical section inside
/// [`PendingTable::complete`], so a racing timeout or cancellation never
/// receives a response for state it already tore down.
async fn deliver_response(shared: &Arc<EngineShared>, body: ResponseBody) {
    let request_id = body.request_id().to_owned();
    match shared.pending.complete(&request_id).await {
        Some(entry) => {
            debug!(
                request_id,
                subtype = entry.subtype.as_str(),
                "response delivered"
            );
            if entry.slot.send(body).is_err() {
                debug!(request_id, "response waiter gone before delivery");
            }
        }
        None => {
            warn!(request_id, "no pending request for response, dropping");
        }
    }
}

/// Dispatch a peer-initiated request to its registered handler.
async fn dispatch_request(shared: &Arc<EngineShared>, request: ControlRequest) {
    let handler = shared.handlers.lock().await.get(&request.subtype).cloned();
    let Some(handler) = handler else {
        warn!(
            request_id = request.request_id.as_str(),
            subtype = request.subtype.as_str(),
            "no handler registered for peer request"
        );
        let response = ResponseBody::Error {
            request_id: request.request_id,
            error: format!("no handler registered for subtype: {}", request.subtype),
        };
        send_response(shared, &response).await;
        return;
    };

    let cancel = shared.stop.child_token();
    shared
        .in_flight
        .insert(&request.request_id, &request.subtype, cancel.clone())
        .await;

    let task_shared = Arc::clone(shared);
    shared
        .tracker
        .spawn(run_handler(task_shared, handler, request, cancel));
}

/// Run one handler to completion and send its control response.
async fn run_handler(
    shared: Arc<EngineShared>,
    handler: RequestHandler,
    request: ControlRequest,
    cancel: CancellationToken,
) {
    let request_id = request.request_id.clone();
    let subtype = request.subtype.clone();

    let result = handler(cancel.clone(), request).await;
    shared.in_flight.finish(&request_id).await;

    let response = if cancel.is_cancelled() {
        debug!(request_id = request_id.as_str(), subtype, "handler cancelled");
        ResponseBody::Error {
            request_id,
            error: format!("request cancelled: {subtype}"),
        }
    } else {
        match result {
            Ok(payload) => ResponseBody::Success {
                request_id,
                response: Some(payload),
            },
            Err(err) => ResponseBody::Error {
                request_id,
                error: err.to_string(),
            },
        }
    };
    send_response(&shared, &response).await;
}

/// Acknowledge a cancellation notice, firing the trigger when the operation
/// is still live.
async fn handle_cancel(shared: &Arc<EngineShared>, notice: CancelNotice) {
    let observation = shared.in_flight.cancel(&notice.request_id).await;
    let response = ResponseBody::CancelAcknowledgment {
        request_id: notice.request_id,
        found: observation.found,
        already_completed: observation.already_completed,
    };
    send_response(shared, &response).await;
}

/// Serialize and write one control response, logging (not propagating) any
/// failure; handler errors must stay local.
async fn send_response(shared: &EngineShared, response: &ResponseBody) {
    let envelope = response.to_wire();
    match serde_json::to_vec(&envelope) {
        Ok(bytes) => {
            if let Err(err) = shared.transport.send(&bytes).await {
                warn!(
                    request_id = response.request_id(),
                    error = %err,
                    "failed to send control response"
                );
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to serialize control response");
        }
    }
}
