//! Typed hook payloads.
//!
//! Peer `hook_callback` requests carry an untyped input map discriminated by
//! `hookEventName`. The event set is closed, so reconstruction is a tagged
//! union match; subtype/method routing elsewhere stays string-keyed because
//! callers extend it.
//!
//! An unrecognized discriminator coerces to a generic stop-shaped input for
//! wire compatibility and is logged at WARN so integration errors stay
//! visible in traces.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::{AppError, Result};

/// The closed set of hook event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// Before a tool is invoked.
    PreToolUse,
    /// After a tool invocation succeeds.
    PostToolUse,
    /// After a tool invocation fails.
    PostToolUseFailure,
    /// When the user submits a prompt.
    UserPromptSubmit,
    /// When the main loop stops.
    Stop,
    /// When a subagent stops.
    SubagentStop,
    /// When a subagent starts.
    SubagentStart,
    /// Before conversation compaction.
    PreCompact,
    /// When the peer emits a notification.
    Notification,
    /// When the peer asks for a permission decision.
    PermissionRequest,
}

impl HookEvent {
    /// Wire name of the event, as carried in `hookEventName`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::PostToolUseFailure => "PostToolUseFailure",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::SubagentStart => "SubagentStart",
            Self::PreCompact => "PreCompact",
            Self::Notification => "Notification",
            Self::PermissionRequest => "PermissionRequest",
        }
    }
}

/// Typed hook input reconstructed from a `hook_callback` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "hookEventName", rename_all_fields = "camelCase")]
pub enum HookInput {
    /// A tool is about to run.
    PreToolUse {
        /// Name of the tool being invoked.
        tool_name: String,
        /// Tool input as supplied by the peer.
        tool_input: Value,
    },
    /// A tool finished successfully.
    PostToolUse {
        /// Name of the tool that ran.
        tool_name: String,
        /// Tool input as supplied by the peer.
        tool_input: Value,
        /// The tool's result.
        tool_response: Value,
    },
    /// A tool finished with an error.
    PostToolUseFailure {
        /// Name of the tool that ran.
        tool_name: String,
        /// Tool input as supplied by the peer.
        tool_input: Value,
        /// The failure description.
        error: String,
    },
    /// The user submitted a prompt.
    UserPromptSubmit {
        /// The submitted prompt text.
        prompt: String,
    },
    /// The main loop is stopping.
    Stop {
        /// Whether a stop hook is already running.
        #[serde(default)]
        stop_hook_active: bool,
    },
    /// A subagent is stopping.
    SubagentStop {
        /// Whether a stop hook is already running.
        #[serde(default)]
        stop_hook_active: bool,
    },
    /// A subagent is starting.
    SubagentStart {
        /// Subagent type, when reported.
        #[serde(default)]
        agent_type: Option<String>,
        /// Prompt handed to the subagent, when reported.
        #[serde(default)]
        prompt: Option<String>,
    },
    /// The conversation is about to be compacted.
    PreCompact {
        /// What initiated compaction (`manual` or `auto`).
        trigger: String,
        /// Operator-supplied compaction instructions.
        #[serde(default)]
        custom_instructions: Option<String>,
    },
    /// The peer emitted a notification.
    Notification {
        /// Notification text.
        message: String,
        /// Optional notification title.
        #[serde(default)]
        title: Option<String>,
    },
    /// The peer asked for a permission decision.
    PermissionRequest {
        /// Name of the tool requesting permission.
        tool_name: String,
        /// Tool input as supplied by the peer.
        tool_input: Value,
        /// Prior suggested permission updates, when present.
        #[serde(default)]
        permission_suggestions: Option<Value>,
    },
}

/// Wire names of every known hook event.
const KNOWN_HOOK_EVENTS: [&str; 10] = [
    "PreToolUse",
    "PostToolUse",
    "PostToolUseFailure",
    "UserPromptSubmit",
    "Stop",
    "SubagentStop",
    "SubagentStart",
    "PreCompact",
    "Notification",
    "PermissionRequest",
];

/// Reconstruct a typed hook input from an untyped callback payload.
///
/// An unrecognized `hookEventName` coerces to a stop-shaped input (logged at
/// WARN) rather than failing the callback.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if the discriminator names a known event
/// but a required field is missing or mistyped.
pub fn reconstruct_hook_input(input: &Map<String, Value>) -> Result<HookInput> {
    let event = input
        .get("hookEventName")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if KNOWN_HOOK_EVENTS.contains(&event) {
        serde_json::from_value(Value::Object(input.clone())).map_err(|err| {
            AppError::Protocol(format!("malformed {event} hook input: {err}"))
        })
    } else {
        warn!(
            hook_event_name = event,
            "unrecognized hook event, coercing to stop-shaped input"
        );
        Ok(HookInput::Stop {
            stop_hook_active: false,
        })
    }
}

/// Synchronous decision fields returned by a hook callback.
///
/// Every field is optional; absent fields are omitted from the wire payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Whether the peer should continue; `false` halts the current turn.
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    /// Suppress the hook's output from the transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    /// Reason shown when `continue` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Decision verdict (e.g. `block`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    /// Message injected into the conversation as a system turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Explanation accompanying the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Event-specific output passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Value>,
}

/// Outcome of a hook callback invocation.
#[derive(Debug, Clone)]
pub enum HookCallbackResult {
    /// A synchronous decision, translated field-for-field onto the wire.
    Sync(HookOutput),
    /// The callback will finish asynchronously; the peer should not wait
    /// beyond the acknowledged timeout.
    Async {
        /// Milliseconds the peer should keep the callback slot open.
        timeout_ms: Option<u64>,
    },
}

impl HookCallbackResult {
    /// Translate the outcome into control-response wire fields.
    #[must_use]
    pub fn to_wire(&self) -> Map<String, Value> {
        match self {
            Self::Sync(output) => match serde_json::to_value(output) {
                Ok(Value::Object(map)) => map,
                // HookOutput always serializes to an object.
                _ => Map::new(),
            },
            Self::Async { timeout_ms } => {
                let mut map = Map::new();
                map.insert("async".into(), json!(true));
                if let Some(timeout) = timeout_ms {
                    map.insert("asyncTimeout".into(), json!(timeout));
                }
                map
            }
        }
    }
}
