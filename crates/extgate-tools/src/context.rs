//! Per-invocation context handed to tool handlers

use crate::registry::ToolDefinition;
use extgate_core::{Result, SessionKey};
use serde_json::Value;
use std::sync::Arc;

/// Accessor over the calling session's scratchpad.
///
/// Every method re-checks that the session is still active, so a handler
/// that outlives its session gets an `auth` error rather than stale data.
pub trait Scratchpad: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<Option<Value>>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// What a handler may see about the call it is serving.
#[derive(Clone)]
pub struct ToolContext {
    pub tool: String,
    pub session: Option<SessionKey>,
    scratchpad: Option<Arc<dyn Scratchpad>>,
    catalog: Arc<Vec<ToolDefinition>>,
}

impl ToolContext {
    pub fn new(
        tool: impl Into<String>,
        session: Option<SessionKey>,
        scratchpad: Option<Arc<dyn Scratchpad>>,
        catalog: Arc<Vec<ToolDefinition>>,
    ) -> Self {
        Self {
            tool: tool.into(),
            session,
            scratchpad,
            catalog,
        }
    }

    /// Context with no session and an empty catalogue, for direct handler calls.
    pub fn detached(tool: impl Into<String>) -> Self {
        Self::new(tool, None, None, Arc::new(Vec::new()))
    }

    pub fn scratchpad(&self) -> Option<&Arc<dyn Scratchpad>> {
        self.scratchpad.as_ref()
    }

    /// Snapshot of the tool catalogue taken when the call started.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool", &self.tool)
            .field("session", &self.session)
            .field("has_scratchpad", &self.scratchpad.is_some())
            .finish()
    }
}
