//! Tool dispatch table and handler definitions
//!
//! Core built-ins and every plugin's tools live in one name → entry map.
//! The first registrant of a name keeps it; later registrations of the same
//! name are rejected and logged, so a plugin can never shadow a core tool.
//!
//! A handler is either *immediate* (a plain function, run on the blocking
//! pool) or *suspending* (returns a future, run as a tokio task). Callers
//! see one `invoke` contract for both.

use crate::context::{Scratchpad, ToolContext};
use crate::schema;
use extgate_core::{GatewayError, Result, SessionKey, CORE_ORIGIN};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a handler returns. Errors from plugin handlers become `handler`
/// errors carrying the plugin id; see `classify_handler_error`.
pub type HandlerResult = anyhow::Result<Value>;

type ImmediateFn = dyn Fn(Value, ToolContext) -> HandlerResult + Send + Sync;
type SuspendingFn = dyn Fn(Value, ToolContext) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A callable tool body.
#[derive(Clone)]
pub enum ToolHandler {
    /// Returns its result without waiting on anything.
    Immediate(Arc<ImmediateFn>),
    /// Waits on external I/O before returning.
    Suspending(Arc<SuspendingFn>),
}

impl ToolHandler {
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Immediate(Arc::new(f))
    }

    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Suspending(Arc::new(move |args, ctx| Box::pin(f(args, ctx))))
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self, Self::Suspending(_))
    }
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("ToolHandler::Immediate"),
            Self::Suspending(_) => f.write_str("ToolHandler::Suspending"),
        }
    }
}

/// The Tool trait — implement this for a self-contained capability.
///
/// Core built-ins are written this way; plugins may use it too and turn the
/// tool into a [`ToolSpec`] with [`ToolSpec::from_tool`].
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "search").
    fn name(&self) -> &str;

    /// Human-readable description sent to the agent.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: Value, ctx: ToolContext) -> HandlerResult;
}

/// A tool as declared by its provider, before the table stamps an origin.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    pub handler: ToolHandler,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            handler,
        }
    }

    pub fn from_tool(tool: impl Tool + 'static) -> Self {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        let name = tool.name().to_string();
        let description = tool.description().to_string();
        let parameter_schema = tool.input_schema();
        let handler = ToolHandler::suspending(move |args, ctx| {
            let tool = tool.clone();
            async move { tool.execute(args, ctx).await }
        });
        Self { name, description, parameter_schema, handler }
    }
}

/// A registered tool: its declaration plus the plugin (or `core`) that owns it.
#[derive(Clone, Debug)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    pub handler: ToolHandler,
    pub origin: String,
}

/// Agent-facing description of one tool.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub origin: String,
}

/// Result of a successful invocation.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub tool: String,
    pub origin: String,
    pub value: Value,
}

/// Per-call inputs supplied by the gateway.
#[derive(Clone, Default)]
pub struct Invocation {
    pub session: Option<SessionKey>,
    pub scratchpad: Option<Arc<dyn Scratchpad>>,
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<String, Arc<ToolEntry>>,
    catalog: Arc<Vec<ToolDefinition>>,
}

impl TableInner {
    fn rebuild_catalog(&mut self) {
        let mut defs: Vec<ToolDefinition> = self
            .entries
            .values()
            .map(|e| ToolDefinition {
                name: e.name.clone(),
                description: e.description.clone(),
                input_schema: e.parameter_schema.clone(),
                origin: e.origin.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        self.catalog = Arc::new(defs);
    }
}

/// Immediate handlers allowed on the blocking pool at once.
pub const DEFAULT_BLOCKING_LIMIT: usize = 64;

/// Process-wide name → tool mapping.
///
/// Lookups clone the entry out of the lock, so a handler runs without
/// holding the table and a failing handler cannot leave it half-updated.
pub struct DispatchTable {
    inner: RwLock<TableInner>,
    timeout: Duration,
    /// A permit is held for as long as an immediate handler's thread runs,
    /// including past its timeout.
    blocking: Arc<Semaphore>,
}

impl DispatchTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(TableInner::default()),
            timeout,
            blocking: Arc::new(Semaphore::new(DEFAULT_BLOCKING_LIMIT)),
        }
    }

    /// Cap the number of immediate handlers running at once (minimum 1).
    pub fn with_blocking_limit(mut self, limit: usize) -> Self {
        self.blocking = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register one tool. Returns `false` when the name is already taken.
    pub fn register(&self, origin: &str, spec: ToolSpec) -> bool {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = inner.entries.get(&spec.name) {
            warn!(
                tool = %spec.name,
                kept = %existing.origin,
                rejected = %origin,
                "Tool name collision, keeping first registration"
            );
            return false;
        }
        debug!(tool = %spec.name, origin = %origin, "Registered tool");
        let entry = ToolEntry {
            name: spec.name.clone(),
            description: spec.description,
            parameter_schema: spec.parameter_schema,
            handler: spec.handler,
            origin: origin.to_string(),
        };
        inner.entries.insert(spec.name, Arc::new(entry));
        inner.rebuild_catalog();
        true
    }

    /// Register a provider's tools in order. Returns the names that were accepted.
    pub fn register_all(&self, origin: &str, specs: Vec<ToolSpec>) -> Vec<String> {
        let mut accepted = Vec::new();
        for spec in specs {
            let name = spec.name.clone();
            if self.register(origin, spec) {
                accepted.push(name);
            }
        }
        accepted
    }

    /// Remove every tool owned by `origin`. Returns how many were removed.
    pub fn unregister_origin(&self, origin: &str) -> usize {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.origin != origin);
        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.rebuild_catalog();
            info!(origin = %origin, removed, "Unregistered tools");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.read().entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        self.definitions().iter().map(|d| d.name.clone()).collect()
    }

    /// Names of the tools owned by one origin, sorted.
    pub fn names_for(&self, origin: &str) -> Vec<String> {
        self.definitions()
            .iter()
            .filter(|d| d.origin == origin)
            .map(|d| d.name.clone())
            .collect()
    }

    /// Catalogue snapshot, sorted by name.
    pub fn definitions(&self) -> Arc<Vec<ToolDefinition>> {
        self.read().catalog.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TableInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Validate and run a tool, bounded by the table's timeout.
    pub async fn invoke(&self, name: &str, args: Value, call: Invocation) -> Result<ToolOutput> {
        self.invoke_cancellable(name, args, call, CancellationToken::new())
            .await
    }

    /// Validate and run a tool with cooperative cancellation.
    ///
    /// On timeout or cancellation a suspending handler's task is aborted.
    /// An immediate handler already running on the blocking pool is left to
    /// finish and keeps its blocking permit until then; its result is
    /// discarded. Waiting for a permit counts against the same timeout.
    pub async fn invoke_cancellable(
        &self,
        name: &str,
        args: Value,
        call: Invocation,
        cancel: CancellationToken,
    ) -> Result<ToolOutput> {
        let entry = self
            .get(name)
            .ok_or_else(|| GatewayError::ToolNotFound(name.to_string()))?;

        schema::validate(&entry.name, &entry.parameter_schema, &args)?;

        let ctx = ToolContext::new(
            entry.name.clone(),
            call.session,
            call.scratchpad,
            self.definitions(),
        );

        let deadline = Instant::now() + self.timeout;
        let task = match &entry.handler {
            ToolHandler::Immediate(f) => {
                let permit = self.blocking_permit(&entry, deadline, &cancel).await?;
                let f = f.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    f(args, ctx)
                })
            }
            ToolHandler::Suspending(f) => {
                let f = f.clone();
                tokio::spawn(async move { f(args, ctx).await })
            }
        };
        let abort = task.abort_handle();

        debug!(
            tool = %entry.name,
            origin = %entry.origin,
            suspending = entry.handler.is_suspending(),
            "Invoking tool"
        );
        let joined = tokio::select! {
            r = tokio::time::timeout_at(deadline, task) => r,
            _ = cancel.cancelled() => {
                abort.abort();
                warn!(tool = %entry.name, "Tool invocation cancelled");
                return Err(GatewayError::Cancelled {
                    tool: entry.name.clone(),
                    origin: entry.origin.clone(),
                });
            }
        };

        match joined {
            Err(_) => {
                abort.abort();
                warn!(tool = %entry.name, origin = %entry.origin, "Tool invocation timed out");
                Err(self.timed_out(&entry))
            }
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    "handler panicked"
                } else {
                    "handler aborted"
                };
                warn!(tool = %entry.name, origin = %entry.origin, "{}", message);
                Err(GatewayError::handler(&entry.name, &entry.origin, message))
            }
            Ok(Ok(Err(e))) => Err(classify_handler_error(&entry, e)),
            Ok(Ok(Ok(value))) => Ok(ToolOutput {
                tool: entry.name.clone(),
                origin: entry.origin.clone(),
                value,
            }),
        }
    }
}

impl DispatchTable {
    /// Wait for a free blocking slot until `deadline`. Hung immediate
    /// handlers hold their slots, so once all are taken new immediate calls
    /// time out here instead of growing the blocking pool.
    async fn blocking_permit(
        &self,
        entry: &ToolEntry,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit> {
        let acquire = self.blocking.clone().acquire_owned();
        tokio::select! {
            r = tokio::time::timeout_at(deadline, acquire) => match r {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_)) => Err(GatewayError::Internal("blocking pool closed".into())),
                Err(_) => {
                    warn!(tool = %entry.name, origin = %entry.origin, "No blocking slot before timeout");
                    Err(self.timed_out(entry))
                }
            },
            _ = cancel.cancelled() => Err(GatewayError::Cancelled {
                tool: entry.name.clone(),
                origin: entry.origin.clone(),
            }),
        }
    }

    fn timed_out(&self, entry: &ToolEntry) -> GatewayError {
        GatewayError::Timeout {
            tool: entry.name.clone(),
            origin: entry.origin.clone(),
            secs: self.timeout.as_secs(),
        }
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// An expired scratchpad session stays `auth`, and core tools keep the kind
/// of the gateway error they raised. Everything else, including a store
/// error inside a plugin handler, is reported as a handler error carrying
/// the tool's origin.
fn classify_handler_error(entry: &ToolEntry, err: anyhow::Error) -> GatewayError {
    let message = match err.downcast::<GatewayError>() {
        Ok(auth @ GatewayError::Auth { .. }) => return auth,
        Ok(gateway_err) if is_core(&entry.origin) => return gateway_err,
        Ok(gateway_err) => gateway_err.to_string(),
        Err(other) => other.to_string(),
    };
    warn!(tool = %entry.name, origin = %entry.origin, error = %message, "Tool handler failed");
    GatewayError::handler(&entry.name, &entry.origin, message)
}

/// True when `origin` names the gateway's own built-ins.
pub fn is_core(origin: &str) -> bool {
    origin == CORE_ORIGIN
}
