//! `mcp_message` request handling: an embedded JSON-RPC tool-call router.
//!
//! The peer tunnels JSON-RPC messages to in-process tool servers through
//! `mcp_message` control requests. Every routed outcome — including routing
//! failures — is a JSON-RPC envelope echoing the original `id`, returned as
//! the control response's success payload.
//!
//! | Method                      | Result                                   |
//! |-----------------------------|------------------------------------------|
//! | `initialize`                | Server name/version and capabilities     |
//! | `notifications/initialized` | Empty success acknowledgment             |
//! | `tools/list`                | Tool descriptor list                     |
//! | `tools/call`                | Tool result, or `-32602`/`-32603` error  |
//! | *(unknown server)*          | `-32600`                                 |
//! | *(unknown method)*          | `-32601`                                 |

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::envelope::ControlRequest;
use crate::session::SessionState;
use crate::{AppError, Result};

/// JSON-RPC protocol revision advertised by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Metadata describing one callable tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name, unique within its server.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub input_schema: Value,
}

/// An in-process tool server reachable through the router.
pub trait ToolServer: Send + Sync {
    /// Server name; the router resolves requests by it.
    fn name(&self) -> &str;

    /// Server version advertised by `initialize`.
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Descriptors of every tool the server exposes.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by name.
    ///
    /// The returned value becomes the JSON-RPC `result` verbatim.
    ///
    /// # Errors
    ///
    /// Any error is surfaced to the peer as a JSON-RPC `-32603` error.
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;
}

/// Parameters of an `mcp_message` control request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpMessageParams {
    /// Target server name.
    server_name: String,
    /// The tunneled JSON-RPC message.
    message: RpcCall,
}

/// The tunneled JSON-RPC call.
#[derive(Debug, Deserialize)]
struct RpcCall {
    /// Correlation id to echo; `null` for notifications.
    #[serde(default)]
    id: Value,
    /// Method name; absent is an invalid request.
    #[serde(default)]
    method: Option<String>,
    /// Method parameters.
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Handle a peer `mcp_message` request.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] only for an unparseable payload; every
/// routable failure is expressed as a JSON-RPC error envelope instead.
pub(crate) async fn handle_mcp_message(
    state: &SessionState,
    cancel: CancellationToken,
    request: &ControlRequest,
) -> Result<Map<String, Value>> {
    let params: McpMessageParams =
        serde_json::from_value(Value::Object(request.payload.clone()))
            .map_err(|err| AppError::Protocol(format!("malformed mcp_message request: {err}")))?;

    let call = params.message;
    let id = call.id;

    let Some(server) = state.tool_servers.get(&params.server_name) else {
        return Ok(rpc_error(
            id,
            -32600,
            &format!("unknown server: {}", params.server_name),
        ));
    };

    let Some(method) = call.method else {
        return Ok(rpc_error(id, -32600, "missing method"));
    };

    debug!(
        server = params.server_name.as_str(),
        method = method.as_str(),
        "routing tool-server message"
    );

    match method.as_str() {
        "initialize" => Ok(rpc_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": server.name(),
                    "version": server.version(),
                },
                "capabilities": { "tools": {} },
            }),
        )),
        "notifications/initialized" => Ok(rpc_result(id, json!({}))),
        "tools/list" => {
            let tools = serde_json::to_value(server.tools())
                .map_err(|err| AppError::Protocol(format!("unserializable tool list: {err}")))?;
            Ok(rpc_result(id, json!({ "tools": tools })))
        }
        "tools/call" => {
            let call_params = call.params.unwrap_or_default();
            let Some(tool_name) = call_params.get("name").and_then(Value::as_str) else {
                return Ok(rpc_error(id, -32602, "missing tool name"));
            };
            let arguments = call_params
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            match server.call_tool(tool_name, arguments, cancel).await {
                Ok(result) => Ok(rpc_result(id, result)),
                Err(err) => Ok(rpc_error(id, -32603, &err.to_string())),
            }
        }
        other => Ok(rpc_error(id, -32601, &format!("method not found: {other}"))),
    }
}

/// Build a JSON-RPC success envelope echoing `id`.
fn rpc_result(id: Value, result: Value) -> Map<String, Value> {
    let mut envelope = Map::new();
    envelope.insert("jsonrpc".into(), "2.0".into());
    envelope.insert("id".into(), id);
    envelope.insert("result".into(), result);
    envelope
}

/// Build a JSON-RPC error envelope echoing `id`.
fn rpc_error(id: Value, code: i64, message: &str) -> Map<String, Value> {
    let mut envelope = Map::new();
    envelope.insert("jsonrpc".into(), "2.0".into());
    envelope.insert("id".into(), id);
    envelope.insert(
        "error".into(),
        json!({ "code": code, "message": message }),
    );
    envelope
}
