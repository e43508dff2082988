//! Core types shared across the gateway crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Origin id used for tools built into the gateway itself.
pub const CORE_ORIGIN: &str = "core";

/// Opaque key/value metadata attached to events.
pub type Metadata = serde_json::Map<String, Value>;

/// Session identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    /// Fresh random session id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// New content announced by a harvesting collaborator.
///
/// The gateway never persists these; a plugin that wants the content
/// stores it itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub raw_payload: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl IngestionEvent {
    pub fn new(raw_payload: impl Into<String>) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            metadata: Metadata::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Guardrail recommendation for a single response.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Warn,
    Reject,
}

/// Veracity verdict computed for one outgoing result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrustVerdict {
    pub score: f64,
    pub signals: BTreeMap<String, f64>,
    pub recommendation: Recommendation,
    pub injected: bool,
}

/// Successful tool invocation as returned to the agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: String,
    pub tool: String,
    pub origin: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustVerdict>,
}

impl ToolResponse {
    pub fn ok(tool: impl Into<String>, origin: impl Into<String>, result: Value) -> Self {
        Self {
            status: "ok".to_string(),
            tool: tool.into(),
            origin: origin.into(),
            result,
            trust: None,
        }
    }
}

/// Render a JSON value as the text an agent would read.
pub fn content_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}
