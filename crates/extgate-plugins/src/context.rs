//! The narrow surface a plugin is allowed to touch

use base64::Engine;
use extgate_core::{GatewayError, Result};
use extgate_nexus::{Nexus, Row};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::Value;
use std::sync::Arc;

/// Security capability lookup offered to plugins.
pub trait SecurityProvider: Send + Sync {
    /// Names of the operations this provider supports (e.g. `"sign"`).
    fn capabilities(&self) -> Vec<String>;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;
}

/// Software HMAC-SHA256 provider backed by `ring`.
pub struct HmacKeyProvider {
    key: hmac::Key,
}

impl HmacKeyProvider {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Fresh random 256-bit key, valid for this process only.
    pub fn generate() -> Result<Self> {
        let mut secret = [0u8; 32];
        SystemRandom::new()
            .fill(&mut secret)
            .map_err(|_| GatewayError::Internal("system random unavailable".into()))?;
        Ok(Self::new(&secret))
    }
}

impl SecurityProvider for HmacKeyProvider {
    fn capabilities(&self) -> Vec<String> {
        vec!["sign".into(), "verify".into(), "hmac-sha256".into()]
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(hmac::sign(&self.key, data).as_ref().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        hmac::verify(&self.key, data, signature).is_ok()
    }
}

impl std::fmt::Debug for HmacKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacKeyProvider")
    }
}

/// Handed to `register_extension`. Plugins keep a clone if they need the
/// store later (from tools or hooks); they never see gateway internals.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    nexus: Nexus,
    security: Option<Arc<dyn SecurityProvider>>,
}

impl PluginContext {
    pub fn new(
        plugin_id: impl Into<String>,
        nexus: Nexus,
        security: Option<Arc<dyn SecurityProvider>>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            nexus,
            security,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Parameterized mutating statement. Never splice caller data into `statement`.
    pub async fn execute(&self, statement: impl Into<String>, params: Vec<Value>) -> Result<usize> {
        self.nexus.execute(statement, params).await
    }

    /// Parameterized read-only statement.
    pub async fn query(&self, statement: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>> {
        self.nexus.query(statement, params).await
    }

    /// Blocking variant for immediate tool handlers.
    pub fn execute_blocking(&self, statement: &str, params: &[Value]) -> Result<usize> {
        self.nexus.execute_blocking(statement, params)
    }

    pub fn query_blocking(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.nexus.query_blocking(statement, params)
    }

    pub fn security(&self) -> Option<Arc<dyn SecurityProvider>> {
        self.security.clone()
    }

    /// Sign with the configured provider and return the signature base64-encoded.
    pub fn sign_base64(&self, data: &[u8]) -> Result<String> {
        let provider = self
            .security
            .as_ref()
            .ok_or_else(|| GatewayError::Config("no security provider configured".into()))?;
        let sig = provider.sign(data)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sig))
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("has_security", &self.security.is_some())
            .finish()
    }
}
