//! `can_use_tool` request handling: permission-decision translation.
//!
//! Without a configured callback every tool use is auto-allowed. With one,
//! the callback's typed decision is translated onto the wire: allow carries
//! optional input/permission updates, deny carries a message and an optional
//! interrupt flag.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::envelope::ControlRequest;
use crate::session::SessionState;
use crate::{AppError, Result};

/// What the peer is asking permission for.
#[derive(Debug, Clone)]
pub struct ToolPermissionRequest {
    /// Name of the tool the peer wants to use.
    pub tool_name: String,
    /// Tool input as supplied by the peer.
    pub input: Map<String, Value>,
    /// Prior suggested permission updates, when present.
    pub suggestions: Option<Value>,
}

/// A permission callback's verdict.
#[derive(Debug, Clone)]
pub enum PermissionDecision {
    /// Let the tool run, optionally with a rewritten input and updated
    /// permission rules.
    Allow {
        /// Replacement tool input.
        updated_input: Option<Map<String, Value>>,
        /// Permission rule updates to apply.
        updated_permissions: Option<Value>,
    },
    /// Refuse the tool use.
    Deny {
        /// Reason reported to the peer.
        message: String,
        /// Whether the peer should interrupt the current turn.
        interrupt: bool,
    },
}

impl PermissionDecision {
    /// Translate the decision into control-response wire fields.
    #[must_use]
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Self::Allow {
                updated_input,
                updated_permissions,
            } => {
                map.insert("behavior".into(), "allow".into());
                if let Some(input) = updated_input {
                    map.insert("updatedInput".into(), Value::Object(input.clone()));
                }
                if let Some(permissions) = updated_permissions {
                    map.insert("updatedPermissions".into(), permissions.clone());
                }
            }
            Self::Deny { message, interrupt } => {
                map.insert("behavior".into(), "deny".into());
                map.insert("message".into(), message.clone().into());
                if *interrupt {
                    map.insert("interrupt".into(), true.into());
                }
            }
        }
        map
    }
}

/// Boxed future returned by a permission callback.
pub type PermissionFuture = Pin<Box<dyn Future<Output = Result<PermissionDecision>> + Send>>;

/// A registered permission callback.
pub type PermissionCallbackFn =
    dyn Fn(ToolPermissionRequest, CancellationToken) -> PermissionFuture + Send + Sync;

/// Parameters of a `can_use_tool` control request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanUseToolParams {
    /// Tool the peer wants to use.
    tool_name: String,
    /// Tool input as supplied by the peer.
    #[serde(default)]
    input: Map<String, Value>,
    /// Prior suggested permission updates.
    #[serde(default)]
    permission_suggestions: Option<Value>,
}

/// Handle a peer `can_use_tool` request.
///
/// # Errors
///
/// - [`AppError::Protocol`] — malformed parameters.
/// - Any error the permission callback itself returns.
pub(crate) async fn handle_can_use_tool(
    state: &SessionState,
    cancel: CancellationToken,
    request: &ControlRequest,
) -> Result<Map<String, Value>> {
    let Some(callback) = &state.permission_callback else {
        let mut allow = Map::new();
        allow.insert("behavior".into(), "allow".into());
        return Ok(allow);
    };

    let params: CanUseToolParams =
        serde_json::from_value(Value::Object(request.payload.clone()))
            .map_err(|err| AppError::Protocol(format!("malformed can_use_tool request: {err}")))?;

    debug!(
        tool_name = params.tool_name.as_str(),
        request_id = request.request_id.as_str(),
        "evaluating tool permission"
    );

    let decision = callback(
        ToolPermissionRequest {
            tool_name: params.tool_name,
            input: params.input,
            suggestions: params.permission_suggestions,
        },
        cancel,
    )
    .await?;

    Ok(decision.to_wire())
}
