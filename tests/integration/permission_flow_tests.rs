//! Permission evaluation through the engine.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use agent_conduit::session::{
    PermissionCallbackFn, PermissionDecision, SessionOptions, ToolPermissionRequest,
};
use agent_conduit::AppError;

use super::test_helpers::started_session;

fn options_with(callback: Arc<PermissionCallbackFn>) -> SessionOptions {
    SessionOptions {
        permission_callback: Some(callback),
        ..SessionOptions::default()
    }
}

// ── Auto-allow ───────────────────────────────────────────────────────────────

/// Without a configured callback every tool use is allowed.
#[tokio::test]
async fn missing_callback_auto_allows() {
    let (engine, _session, mut peer) = started_session(SessionOptions::default()).await;

    peer.send_peer_request(
        "srv_p1",
        "can_use_tool",
        json!({ "toolName": "Bash", "input": { "command": "ls" } }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "success");
    assert_eq!(sent["response"]["response"], json!({ "behavior": "allow" }));

    engine.shutdown().await;
}

// ── Callback translation ─────────────────────────────────────────────────────

/// The callback sees the extracted request fields.
#[tokio::test]
async fn callback_receives_request_fields() {
    let seen: Arc<Mutex<Option<ToolPermissionRequest>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let callback: Arc<PermissionCallbackFn> = Arc::new(move |request, _cancel| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            *sink.lock().await = Some(request);
            Ok(PermissionDecision::Allow {
                updated_input: None,
                updated_permissions: None,
            })
        })
    });
    let (engine, _session, mut peer) = started_session(options_with(callback)).await;

    peer.send_peer_request(
        "srv_p2",
        "can_use_tool",
        json!({
            "toolName": "Write",
            "input": { "path": "/tmp/notes" },
            "permissionSuggestions": [{ "type": "addRules" }],
        }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["response"]["behavior"], "allow");

    let captured = seen.lock().await.take().expect("callback must run");
    assert_eq!(captured.tool_name, "Write");
    assert_eq!(captured.input["path"], "/tmp/notes");
    assert_eq!(captured.suggestions, Some(json!([{ "type": "addRules" }])));

    engine.shutdown().await;
}

/// A deny decision carries its message and interrupt flag.
#[tokio::test]
async fn deny_decision_translates() {
    let callback: Arc<PermissionCallbackFn> = Arc::new(|request, _cancel| {
        Box::pin(async move {
            Ok(PermissionDecision::Deny {
                message: format!("{} is not allowed here", request.tool_name),
                interrupt: true,
            })
        })
    });
    let (engine, _session, mut peer) = started_session(options_with(callback)).await;

    peer.send_peer_request(
        "srv_p3",
        "can_use_tool",
        json!({ "toolName": "Bash", "input": { "command": "rm" } }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(
        sent["response"]["response"],
        json!({
            "behavior": "deny",
            "message": "Bash is not allowed here",
            "interrupt": true,
        })
    );

    engine.shutdown().await;
}

/// An allow with a rewritten input carries `updatedInput`.
#[tokio::test]
async fn allow_with_updated_input_translates() {
    let callback: Arc<PermissionCallbackFn> = Arc::new(|request, _cancel| {
        Box::pin(async move {
            let mut updated: Map<String, Value> = request.input;
            updated.insert("sandbox".into(), json!(true));
            Ok(PermissionDecision::Allow {
                updated_input: Some(updated),
                updated_permissions: None,
            })
        })
    });
    let (engine, _session, mut peer) = started_session(options_with(callback)).await;

    peer.send_peer_request(
        "srv_p4",
        "can_use_tool",
        json!({ "toolName": "Bash", "input": { "command": "make" } }),
    )
    .await;

    let sent = peer.next_sent().await;
    let body = &sent["response"]["response"];
    assert_eq!(body["behavior"], "allow");
    assert_eq!(body["updatedInput"]["command"], "make");
    assert_eq!(body["updatedInput"]["sandbox"], true);

    engine.shutdown().await;
}

/// A callback failure surfaces as an error response, not a crash.
#[tokio::test]
async fn callback_error_becomes_error_response() {
    let callback: Arc<PermissionCallbackFn> = Arc::new(|_request, _cancel| {
        Box::pin(async { Err(AppError::Handler("permission service down".into())) })
    });
    let (engine, _session, mut peer) = started_session(options_with(callback)).await;

    peer.send_peer_request(
        "srv_p5",
        "can_use_tool",
        json!({ "toolName": "Bash", "input": {} }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "error");
    assert_eq!(sent["response"]["error"], "permission service down");

    engine.shutdown().await;
}
