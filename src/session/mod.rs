//! Session façade over the correlation engine.
//!
//! A [`Session`] owns the mutable state behind the three control-request
//! handlers it registers on the engine:
//!
//! - `hook_callback` — invokes registered hook callbacks ([`hooks`]).
//! - `mcp_message`   — routes JSON-RPC calls to in-process tool servers
//!   ([`router`]).
//! - `can_use_tool`  — translates permission decisions ([`permission`]).
//!
//! Before ordinary traffic, [`Session::initialize`] performs one `initialize`
//! exchange advertising hook registrations and agent definitions, and
//! captures the peer's response as the initialization-result snapshot.

pub mod hooks;
pub mod permission;
pub mod router;

pub use hooks::{HookCallbackFn, HookCallbackFuture};
pub use permission::{PermissionCallbackFn, PermissionDecision, PermissionFuture, ToolPermissionRequest};
pub use router::{ToolDescriptor, ToolServer};

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::CorrelationEngine;
use crate::protocol::HookEvent;
use crate::{AppError, Result};

/// One hook registration: an event, an optional matcher, and the callbacks
/// to run when the peer fires the hook.
pub struct HookRegistration {
    /// Event the callbacks subscribe to.
    pub event: HookEvent,
    /// Optional matcher expression evaluated by the peer (e.g. a tool-name
    /// pattern for tool events).
    pub matcher: Option<String>,
    /// Callbacks in invocation order.
    pub callbacks: Vec<Arc<HookCallbackFn>>,
    /// Per-matcher timeout advertised to the peer (seconds).
    pub timeout_seconds: Option<u64>,
}

/// A custom agent definition advertised during initialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    /// What the agent is for.
    pub description: String,
    /// The agent's system prompt.
    pub prompt: String,
    /// Tool names the agent may use; absent means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Model override for the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Everything a session can register: hooks, in-process tool servers, a
/// permission callback, and custom agent definitions.
#[derive(Default)]
pub struct SessionOptions {
    /// Hook registrations in order; callback ids are minted from this order.
    pub hooks: Vec<HookRegistration>,
    /// In-process tool servers, keyed by their reported names.
    pub tool_servers: Vec<Arc<dyn ToolServer>>,
    /// Permission callback; absent means every tool use is auto-allowed.
    pub permission_callback: Option<Arc<PermissionCallbackFn>>,
    /// Custom agent definitions keyed by agent name.
    pub agents: HashMap<String, AgentDefinition>,
}

/// One `{matcher, callbackIds, timeout?}` entry of the initialize payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HookInitEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) matcher: Option<String>,
    pub(crate) callback_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) timeout: Option<u64>,
}

/// Shared state behind the session's registered handlers.
pub(crate) struct SessionState {
    pub(crate) client_name: String,
    pub(crate) client_version: String,
    /// Registered hook callbacks keyed by minted callback id.
    pub(crate) hook_callbacks: HashMap<String, Arc<HookCallbackFn>>,
    /// Initialize-payload hook entries grouped per event, in registration
    /// order.
    pub(crate) hook_init_entries: Vec<(HookEvent, Vec<HookInitEntry>)>,
    /// In-process tool servers keyed by name.
    pub(crate) tool_servers: HashMap<String, Arc<dyn ToolServer>>,
    pub(crate) permission_callback: Option<Arc<PermissionCallbackFn>>,
    pub(crate) agents: HashMap<String, AgentDefinition>,
    /// Most recent initialization-result snapshot, exposed only as a copy.
    pub(crate) init_result: Mutex<Option<Map<String, Value>>>,
}

/// Façade registering the session-level protocol handlers on an engine and
/// owning their mutable state.
pub struct Session {
    engine: Arc<CorrelationEngine>,
    state: Arc<SessionState>,
}

impl Session {
    /// Build a session from its registrations.
    ///
    /// Hook callback ids are minted here, deterministically
    /// (`hook_0`, `hook_1`, …) in registration order. Tool servers are keyed
    /// by their reported names; a duplicate name replaces the earlier server.
    #[must_use]
    pub fn new(engine: Arc<CorrelationEngine>, options: SessionOptions) -> Self {
        let mut hook_callbacks = HashMap::new();
        let mut hook_init_entries: Vec<(HookEvent, Vec<HookInitEntry>)> = Vec::new();
        let mut next_callback = 0usize;

        for registration in options.hooks {
            let mut callback_ids = Vec::with_capacity(registration.callbacks.len());
            for callback in registration.callbacks {
                let id = format!("hook_{next_callback}");
                next_callback += 1;
                hook_callbacks.insert(id.clone(), callback);
                callback_ids.push(id);
            }
            let entry = HookInitEntry {
                matcher: registration.matcher,
                callback_ids,
                timeout: registration.timeout_seconds,
            };
            match hook_init_entries
                .iter_mut()
                .find(|(event, _)| *event == registration.event)
            {
                Some((_, entries)) => entries.push(entry),
                None => hook_init_entries.push((registration.event, vec![entry])),
            }
        }

        let tool_servers = Self::register_tool_servers(options.tool_servers);
        let config = engine.config();

        let state = SessionState {
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
            hook_callbacks,
            hook_init_entries,
            tool_servers,
            permission_callback: options.permission_callback,
            agents: options.agents,
            init_result: Mutex::new(None),
        };

        Self {
            engine,
            state: Arc::new(state),
        }
    }

    /// Key each in-process tool server by its reported name.
    fn register_tool_servers(
        servers: Vec<Arc<dyn ToolServer>>,
    ) -> HashMap<String, Arc<dyn ToolServer>> {
        let mut table: HashMap<String, Arc<dyn ToolServer>> = HashMap::new();
        for server in servers {
            let name = server.name().to_owned();
            if table.insert(name.clone(), server).is_some() {
                warn!(server = name.as_str(), "duplicate tool server name, replacing");
            }
        }
        table
    }

    /// Register the session's three control-request handlers on the engine.
    ///
    /// Registration replaces any earlier handler for the same subtypes.
    pub async fn register_handlers(&self) {
        let state = Arc::clone(&self.state);
        self.engine
            .register_handler("hook_callback", move |cancel, request| {
                let state = Arc::clone(&state);
                async move { hooks::handle_hook_callback(&state, cancel, &request).await }
            })
            .await;

        let state = Arc::clone(&self.state);
        self.engine
            .register_handler("mcp_message", move |cancel, request| {
                let state = Arc::clone(&state);
                async move { router::handle_mcp_message(&state, cancel, &request).await }
            })
            .await;

        let state = Arc::clone(&self.state);
        self.engine
            .register_handler("can_use_tool", move |cancel, request| {
                let state = Arc::clone(&state);
                async move { permission::handle_can_use_tool(&state, cancel, &request).await }
            })
            .await;

        debug!("session handlers registered");
    }

    /// Whether this session must perform the `initialize` exchange before
    /// ordinary traffic.
    #[must_use]
    pub fn needs_initialization(&self) -> bool {
        !self.state.hook_init_entries.is_empty()
            || self.state.permission_callback.is_some()
            || !self.state.tool_servers.is_empty()
            || !self.state.agents.is_empty()
    }

    /// Perform the `initialize` exchange, capturing the peer's response as
    /// the initialization-result snapshot.
    ///
    /// A no-op when [`needs_initialization`](Self::needs_initialization) is
    /// `false`.
    ///
    /// # Errors
    ///
    /// Propagates [`CorrelationEngine::send_request`] failures.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.needs_initialization() {
            return Ok(());
        }

        let payload = self.build_initialize_payload()?;
        let timeout = self.engine.config().initialize_timeout();
        let response = self
            .engine
            .send_request("initialize", payload, timeout, cancel)
            .await?;

        *self.state.init_result.lock().await = response;
        debug!("session initialized");
        Ok(())
    }

    /// A copy of the most recent initialization-result snapshot, if the
    /// `initialize` exchange has completed.
    pub async fn initialization_result(&self) -> Option<Map<String, Value>> {
        self.state.init_result.lock().await.clone()
    }

    /// Assemble the `initialize` request payload.
    fn build_initialize_payload(&self) -> Result<Map<String, Value>> {
        let mut payload = Map::new();
        payload.insert(
            "clientInfo".into(),
            json!({
                "name": self.state.client_name,
                "version": self.state.client_version,
            }),
        );

        if !self.state.hook_init_entries.is_empty() {
            let mut hooks = Map::new();
            for (event, entries) in &self.state.hook_init_entries {
                let value = serde_json::to_value(entries).map_err(|err| {
                    AppError::Protocol(format!("unserializable hook registration: {err}"))
                })?;
                hooks.insert(event.as_str().to_owned(), value);
            }
            payload.insert("hooks".into(), Value::Object(hooks));
        }

        if !self.state.agents.is_empty() {
            let agents = serde_json::to_value(&self.state.agents).map_err(|err| {
                AppError::Protocol(format!("unserializable agent definition: {err}"))
            })?;
            payload.insert("agents".into(), agents);
        }

        Ok(payload)
    }
}
