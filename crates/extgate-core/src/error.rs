//! Error types for the extension gateway
//!
//! Every failure that can cross the gateway boundary maps onto a stable
//! [`ErrorKind`]. Callers only ever see an [`ErrorEnvelope`], never the
//! internal error chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("plugin load failed: {plugin_id} - {reason}")]
    Load { plugin_id: String, reason: String },

    #[error("invalid parameters for {tool}: {reason}")]
    Validation { tool: String, reason: String },

    #[error("handler failed: {tool} - {message}")]
    Handler {
        tool: String,
        origin: String,
        message: String,
    },

    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("tool timed out after {secs}s: {tool}")]
    Timeout { tool: String, origin: String, secs: u64 },

    #[error("tool cancelled: {tool}")]
    Cancelled { tool: String, origin: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Stable error classification surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Load,
    Validation,
    Handler,
    Auth,
    Store,
    Timeout,
    Cancelled,
    NotFound,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Validation => "validation",
            Self::Handler => "handler",
            Self::Auth => "auth",
            Self::Store => "store",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn load(plugin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            plugin_id: plugin_id.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn handler(
        tool: impl Into<String>,
        origin: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Handler {
            tool: tool.into(),
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load { .. } => ErrorKind::Load,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Handler { .. } => ErrorKind::Handler,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Store(_) => ErrorKind::Store,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::ToolNotFound(_) | Self::PluginNotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The plugin (or `core`) a failure is attributed to, when known.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Load { plugin_id, .. } => Some(plugin_id),
            Self::Handler { origin, .. }
            | Self::Timeout { origin, .. }
            | Self::Cancelled { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Convert into the caller-facing envelope.
    ///
    /// Internal failures are reported with a generic message so io/json
    /// detail does not leak across the gateway boundary.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let message = match self.kind() {
            ErrorKind::Internal => "internal gateway error".to_string(),
            _ => self.to_string(),
        };
        ErrorEnvelope {
            status: "error".to_string(),
            error_kind: self.kind(),
            message,
            origin: self.origin().map(String::from),
        }
    }
}

/// Structured error returned to callers in place of a result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub status: String,
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_carries_origin() {
        let err = GatewayError::handler("search", "weather", "boom");
        let env = err.to_envelope();
        assert_eq!(env.status, "error");
        assert_eq!(env.error_kind, ErrorKind::Handler);
        assert_eq!(env.origin.as_deref(), Some("weather"));
        assert!(env.message.contains("boom"));
    }

    #[test]
    fn internal_errors_are_redacted() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "/secret/path missing");
        let env = GatewayError::from(io).to_envelope();
        assert_eq!(env.error_kind, ErrorKind::Internal);
        assert!(!env.message.contains("/secret/path"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotFound).unwrap(),
            r#""not_found""#
        );
        assert_eq!(ErrorKind::Auth.to_string(), "auth");
    }
}
