//! Hook callback dispatch through the engine.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use agent_conduit::protocol::{HookCallbackResult, HookEvent, HookInput, HookOutput};
use agent_conduit::session::{HookCallbackFn, HookRegistration, SessionOptions};

use super::test_helpers::started_session;

/// A callback that records its invocations and answers with a block
/// decision.
fn recording_callback() -> (Arc<Mutex<Vec<(HookInput, Option<String>)>>>, Arc<HookCallbackFn>) {
    let seen: Arc<Mutex<Vec<(HookInput, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: Arc<HookCallbackFn> = Arc::new(move |input, tool_use_id, _cancel| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().await.push((input, tool_use_id));
            Ok(HookCallbackResult::Sync(HookOutput {
                decision: Some("block".into()),
                reason: Some("recorded".into()),
                ..HookOutput::default()
            }))
        })
    });
    (seen, callback)
}

fn single_hook_options(event: HookEvent, callback: Arc<HookCallbackFn>) -> SessionOptions {
    SessionOptions {
        hooks: vec![HookRegistration {
            event,
            matcher: None,
            callbacks: vec![callback],
            timeout_seconds: None,
        }],
        ..SessionOptions::default()
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// A `hook_callback` request reconstructs the typed input, invokes the
/// callback with the tool-use id, and translates the decision onto the wire.
#[tokio::test]
async fn pre_tool_use_hook_dispatches() {
    let (seen, callback) = recording_callback();
    let (engine, _session, mut peer) =
        started_session(single_hook_options(HookEvent::PreToolUse, callback)).await;

    peer.send_peer_request(
        "srv_h1",
        "hook_callback",
        json!({
            "callbackId": "hook_0",
            "input": {
                "hookEventName": "PreToolUse",
                "toolName": "Bash",
                "toolInput": { "command": "rm -rf /" },
            },
            "toolUseId": "tu_9",
        }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "success");
    assert_eq!(sent["response"]["response"]["decision"], "block");
    assert_eq!(sent["response"]["response"]["reason"], "recorded");

    let invocations = seen.lock().await;
    assert_eq!(invocations.len(), 1);
    let (input, tool_use_id) = &invocations[0];
    assert_eq!(tool_use_id.as_deref(), Some("tu_9"));
    let HookInput::PreToolUse { tool_name, tool_input } = input else {
        panic!("expected a PreToolUse input, got {input:?}");
    };
    assert_eq!(tool_name, "Bash");
    assert_eq!(tool_input["command"], "rm -rf /");

    engine.shutdown().await;
}

/// An unknown callback id is a handler failure, not a crash.
#[tokio::test]
async fn unknown_callback_id_yields_error_response() {
    let (_seen, callback) = recording_callback();
    let (engine, _session, mut peer) =
        started_session(single_hook_options(HookEvent::Stop, callback)).await;

    peer.send_peer_request(
        "srv_h2",
        "hook_callback",
        json!({ "callbackId": "hook_42", "input": { "hookEventName": "Stop" } }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "error");
    let message = sent["response"]["error"].as_str().expect("error text");
    assert!(
        message.contains("no hook callback registered"),
        "unexpected message: {message}"
    );

    engine.shutdown().await;
}

/// An unrecognized event name reaches the callback as a stop-shaped input.
#[tokio::test]
async fn unrecognized_event_reaches_callback_as_stop() {
    let (seen, callback) = recording_callback();
    let (engine, _session, mut peer) =
        started_session(single_hook_options(HookEvent::Stop, callback)).await;

    peer.send_peer_request(
        "srv_h3",
        "hook_callback",
        json!({
            "callbackId": "hook_0",
            "input": { "hookEventName": "BrandNewEvent", "extra": true },
        }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "success");

    let invocations = seen.lock().await;
    assert!(
        matches!(&invocations[0].0, HookInput::Stop { stop_hook_active: false }),
        "unexpected input: {:?}",
        invocations[0].0
    );

    engine.shutdown().await;
}

/// An asynchronous callback outcome acknowledges with `async` wire fields.
#[tokio::test]
async fn async_outcome_translates_on_wire() {
    let callback: Arc<HookCallbackFn> = Arc::new(|_input, _tool_use_id, _cancel| {
        Box::pin(async {
            Ok(HookCallbackResult::Async {
                timeout_ms: Some(2000),
            })
        })
    });
    let (engine, _session, mut peer) =
        started_session(single_hook_options(HookEvent::Notification, callback)).await;

    peer.send_peer_request(
        "srv_h4",
        "hook_callback",
        json!({
            "callbackId": "hook_0",
            "input": { "hookEventName": "Notification", "message": "build done" },
        }),
    )
    .await;

    let sent = peer.next_sent().await;
    assert_eq!(sent["response"]["subtype"], "success");
    assert_eq!(sent["response"]["response"]["async"], true);
    assert_eq!(sent["response"]["response"]["asyncTimeout"], 2000);

    engine.shutdown().await;
}
