//! Engine stop, fatal-error recording, and waiter unblocking.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;

use agent_conduit::AppError;

use super::test_helpers::{spawn_request, started_engine};

const TIMEOUT: Duration = Duration::from_secs(60);

// ── Stop unblocks waiters ────────────────────────────────────────────────────

/// Every concurrent in-flight `send_request` returns promptly once the
/// engine stops, each with a stopped error.
#[tokio::test]
async fn shutdown_unblocks_every_waiter() {
    let (engine, mut peer, _data) = started_engine().await;

    let calls: Vec<_> = (0..4)
        .map(|_| spawn_request(&engine, "ping", json!({}), TIMEOUT))
        .collect();
    for _ in 0..4 {
        peer.next_sent().await;
    }

    engine.shutdown().await;

    for call in calls {
        let err = call
            .await
            .expect("task must join")
            .expect_err("stopped engine must fail its waiters");
        assert!(matches!(&err, AppError::Stopped(_)), "unexpected kind: {err:?}");
    }
    assert!(engine.pending_request_ids().await.is_empty());
}

/// Requests sent after shutdown fail fast without touching the wire.
#[tokio::test]
async fn send_after_shutdown_fails_fast() {
    let (engine, mut peer, _data) = started_engine().await;
    engine.shutdown().await;

    let err = engine
        .send_request("ping", Map::new(), TIMEOUT, &CancellationToken::new())
        .await
        .expect_err("stopped engine must refuse new requests");
    assert!(matches!(&err, AppError::Stopped(_)), "unexpected kind: {err:?}");
    assert!(
        peer.outbound.try_recv().is_err(),
        "no envelope must reach the wire after stop"
    );
}

/// Shutdown is idempotent.
#[tokio::test]
async fn shutdown_is_idempotent() {
    let (engine, _peer, _data) = started_engine().await;
    engine.shutdown().await;
    engine.shutdown().await;
    assert!(engine.is_stopped());
}

// ── Transport failures ───────────────────────────────────────────────────────

/// A transport read failure is recorded once as the fatal error and fails
/// current and future waiters with it.
#[tokio::test]
async fn transport_failure_fails_waiters_with_fatal_error() {
    let (engine, mut peer, _data) = started_engine().await;

    let call = spawn_request(&engine, "ping", json!({}), TIMEOUT);
    peer.next_sent().await;

    peer.errors
        .send(AppError::Transport("stdout closed unexpectedly".into()))
        .await
        .expect("error channel must be open");

    let err = call
        .await
        .expect("task must join")
        .expect_err("transport failure must fail the waiter");
    assert!(matches!(&err, AppError::Transport(_)), "unexpected kind: {err:?}");
    assert!(err.to_string().contains("stdout closed unexpectedly"));

    let fatal = engine.fatal_error().await.expect("fatal error must be recorded");
    assert!(matches!(&fatal, AppError::Transport(_)));

    // Future sends fail fast with the same recorded error.
    let err = engine
        .send_request("ping", Map::new(), TIMEOUT, &CancellationToken::new())
        .await
        .expect_err("failed engine must refuse new requests");
    assert!(err.to_string().contains("stdout closed unexpectedly"));
}

/// The message stream closing stops the engine and unblocks waiters.
#[tokio::test]
async fn stream_close_stops_engine() {
    let (engine, mut peer, _data) = started_engine().await;

    let call = spawn_request(&engine, "ping", json!({}), TIMEOUT);
    peer.next_sent().await;

    drop(peer.inbound);

    let err = call
        .await
        .expect("task must join")
        .expect_err("closed stream must fail the waiter");
    assert!(matches!(&err, AppError::Stopped(_)), "unexpected kind: {err:?}");
    assert!(engine.is_stopped());
}
