//! RPC router — dispatches line-protocol method calls to the gateway
//!
//! Each method (auth, tools.call, ingest, plugins.list, etc.) is handled by
//! a dedicated async function. Gateway errors keep their envelope so the
//! caller always sees `error_kind` and `origin`.

use crate::auth::Credentials;
use crate::gateway::Gateway;
use extgate_core::{ErrorKind, GatewayError, IngestionEvent, RpcResponse, SessionKey};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Connection context passed to RPC handlers.
pub struct ConnectionContext {
    pub gateway: Arc<Gateway>,
    /// Session opened by `auth` on this connection, if any.
    pub session: Option<SessionKey>,
}

impl ConnectionContext {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway, session: None }
    }
}

/// Handler failure: either a protocol-level problem or a gateway error.
#[derive(Debug)]
pub enum RpcFailure {
    Protocol(i32, String),
    MethodNotFound(String),
    Gateway(GatewayError),
}

impl From<GatewayError> for RpcFailure {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

/// Result type for RPC handlers.
pub type RpcResult = Result<Value, RpcFailure>;

fn missing(param: &str) -> RpcFailure {
    RpcFailure::Protocol(-32602, format!("Missing required param: {}", param))
}

/// Route an RPC method call. `auth` updates `ctx.session` on success.
pub async fn route_rpc(method: &str, params: Value, ctx: &mut ConnectionContext) -> RpcResult {
    debug!(method, "rpc");
    match method {
        "auth" => handle_auth(params, ctx).await,
        "logout" => handle_logout(params, ctx),
        "tools.list" => handle_tools_list(params, ctx),
        "tools.call" => handle_tools_call(params, ctx).await,
        "ingest" => handle_ingest(params, ctx),
        "plugins.list" => handle_plugins_list(params, ctx),
        "plugins.reload" => handle_plugins_reload(params, ctx).await,
        "plugins.unload" => handle_plugins_unload(params, ctx).await,
        "health" => Ok(ctx.gateway.health()),
        "echo" => Ok(params),
        _ => Err(RpcFailure::MethodNotFound(method.to_string())),
    }
}

/// Convert an RPC result to an RpcResponse.
pub fn to_response(id: &str, result: RpcResult) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err(RpcFailure::Protocol(code, message)) => RpcResponse::err(id, code, message),
        Err(RpcFailure::MethodNotFound(method)) => RpcResponse::method_not_found(id, &method),
        Err(RpcFailure::Gateway(e)) => RpcResponse::envelope(id, error_code(e.kind()), e.to_envelope()),
    }
}

fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Auth => -32000,
        ErrorKind::NotFound => -32001,
        ErrorKind::Validation => -32602,
        _ => -32002,
    }
}

/// Explicit `params.session` wins over the connection's session.
fn session_of(params: &Value, ctx: &ConnectionContext) -> Result<SessionKey, RpcFailure> {
    match params.get("session").and_then(Value::as_str) {
        Some(s) => Ok(SessionKey::new(s)),
        None => ctx
            .session
            .clone()
            .ok_or_else(|| RpcFailure::Gateway(GatewayError::auth("not authenticated"))),
    }
}

// ---------------------------------------------------------------------------
// auth — open a session
// ---------------------------------------------------------------------------

async fn handle_auth(params: Value, ctx: &mut ConnectionContext) -> RpcResult {
    let credentials: Credentials = if params.is_null() {
        Credentials::default()
    } else {
        serde_json::from_value(params)
            .map_err(|e| RpcFailure::Protocol(-32602, format!("Invalid credentials: {}", e)))?
    };
    let info = ctx.gateway.authenticate(&credentials).await?;
    ctx.session = Some(info.session_id.clone());
    Ok(json!(info))
}

// ---------------------------------------------------------------------------
// logout — end a session early
// ---------------------------------------------------------------------------

fn handle_logout(params: Value, ctx: &mut ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    let removed = ctx.gateway.logout(&session);
    if ctx.session.as_ref() == Some(&session) {
        ctx.session = None;
    }
    Ok(json!({ "ok": removed }))
}

// ---------------------------------------------------------------------------
// tools.list — catalogue for the session
// ---------------------------------------------------------------------------

fn handle_tools_list(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    let tools = ctx.gateway.tools(&session)?;
    Ok(json!({ "tools": *tools }))
}

// ---------------------------------------------------------------------------
// tools.call — invoke a tool on behalf of the session
// ---------------------------------------------------------------------------

async fn handle_tools_call(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    let tool = params
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("tool"))?;
    let args = params.get("args").cloned().unwrap_or_else(|| json!({}));

    let response = ctx.gateway.call_tool(&session, tool, args).await?;
    Ok(json!(response))
}

// ---------------------------------------------------------------------------
// ingest — broadcast a payload to every active plugin
// ---------------------------------------------------------------------------

fn handle_ingest(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    ctx.gateway.sessions().resolve(&session)?;

    let payload = params
        .get("payload")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("payload"))?;
    let mut event = IngestionEvent::new(payload);
    if let Some(Value::Object(meta)) = params.get("metadata") {
        event.metadata = meta.clone();
    }

    let targeted = ctx.gateway.ingest(event);
    info!(targeted, bytes = payload.len(), "Ingestion accepted");
    Ok(json!({ "accepted": true, "targeted": targeted }))
}

// ---------------------------------------------------------------------------
// plugins.list / plugins.reload / plugins.unload
// ---------------------------------------------------------------------------

fn handle_plugins_list(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    ctx.gateway.sessions().resolve(&session)?;
    Ok(json!({ "plugins": ctx.gateway.plugins() }))
}

async fn handle_plugins_reload(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    ctx.gateway.sessions().resolve(&session)?;
    let plugin_id = params
        .get("plugin_id")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("plugin_id"))?;
    let status = ctx.gateway.reload_plugin(plugin_id).await?;
    Ok(json!(status))
}

async fn handle_plugins_unload(params: Value, ctx: &ConnectionContext) -> RpcResult {
    let session = session_of(&params, ctx)?;
    ctx.gateway.sessions().resolve(&session)?;
    let plugin_id = params
        .get("plugin_id")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("plugin_id"))?;
    let removed = ctx.gateway.unload_plugin(plugin_id).await?;
    info!(plugin_id, removed, "Plugin unloaded over rpc");
    Ok(json!({ "plugin_id": plugin_id, "tools_removed": removed }))
}
