//! `hook_callback` request handling.
//!
//! The peer fires a registered hook by callback id, passing an untyped input
//! map. The handler reconstructs the typed hook input, invokes the callback,
//! and translates its outcome into wire fields.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::envelope::ControlRequest;
use crate::protocol::hooks::{reconstruct_hook_input, HookCallbackResult, HookInput};
use crate::session::SessionState;
use crate::{AppError, Result};

/// Boxed future returned by a hook callback.
pub type HookCallbackFuture = Pin<Box<dyn Future<Output = Result<HookCallbackResult>> + Send>>;

/// A registered hook callback.
///
/// Receives the typed input, the tool-use id when the event concerns one,
/// and a cancellation token derived from the handler's; observing the token
/// is cooperative.
pub type HookCallbackFn =
    dyn Fn(HookInput, Option<String>, CancellationToken) -> HookCallbackFuture + Send + Sync;

/// Parameters of a `hook_callback` control request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HookCallbackParams {
    /// Minted id of the callback to invoke.
    callback_id: String,
    /// Untyped hook input, discriminated by `hookEventName`.
    #[serde(default)]
    input: Map<String, Value>,
    /// Tool-use id for tool-scoped events.
    #[serde(default)]
    tool_use_id: Option<String>,
}

/// Handle a peer `hook_callback` request.
///
/// # Errors
///
/// - [`AppError::Protocol`] — malformed parameters or a known event with
///   missing fields.
/// - [`AppError::Handler`] — no callback registered under the id.
/// - Any error the callback itself returns.
pub(crate) async fn handle_hook_callback(
    state: &SessionState,
    cancel: CancellationToken,
    request: &ControlRequest,
) -> Result<Map<String, Value>> {
    let params: HookCallbackParams =
        serde_json::from_value(Value::Object(request.payload.clone())).map_err(|err| {
            AppError::Protocol(format!("malformed hook_callback request: {err}"))
        })?;

    let callback = state
        .hook_callbacks
        .get(&params.callback_id)
        .ok_or_else(|| {
            AppError::Handler(format!(
                "no hook callback registered for id: {}",
                params.callback_id
            ))
        })?;

    let input = reconstruct_hook_input(&params.input)?;
    debug!(
        callback_id = params.callback_id.as_str(),
        request_id = request.request_id.as_str(),
        "invoking hook callback"
    );

    let outcome = callback(input, params.tool_use_id, cancel).await?;
    Ok(outcome.to_wire())
}
