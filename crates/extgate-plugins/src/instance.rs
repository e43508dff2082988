//! What a plugin's registration hook hands back

use extgate_core::Metadata;
use extgate_tools::ToolSpec;
use serde::Serialize;
use std::sync::Arc;

/// Anything that can list tools. Every plugin implements this.
pub trait ToolProvider: Send + Sync {
    fn get_tools(&self) -> Vec<ToolSpec>;
}

/// A plugin that also wants lifecycle callbacks.
#[async_trait::async_trait]
pub trait LifecycleExtension: ToolProvider {
    /// Called once after the plugin's tools are registered.
    async fn on_startup(&self) -> anyhow::Result<()>;

    /// Called for every ingestion event. The result is discarded.
    async fn on_ingestion(&self, raw_payload: &str, metadata: &Metadata) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Minimal,
    Full,
}

/// A registered plugin, classified once at load time.
#[derive(Clone)]
pub enum PluginInstance {
    Minimal(Arc<dyn ToolProvider>),
    Full(Arc<dyn LifecycleExtension>),
}

impl PluginInstance {
    pub fn minimal(provider: impl ToolProvider + 'static) -> Self {
        Self::Minimal(Arc::new(provider))
    }

    pub fn full(extension: impl LifecycleExtension + 'static) -> Self {
        Self::Full(Arc::new(extension))
    }

    pub fn tier(&self) -> Tier {
        match self {
            Self::Minimal(_) => Tier::Minimal,
            Self::Full(_) => Tier::Full,
        }
    }

    pub fn get_tools(&self) -> Vec<ToolSpec> {
        match self {
            Self::Minimal(p) => p.get_tools(),
            Self::Full(e) => e.get_tools(),
        }
    }

    pub fn lifecycle(&self) -> Option<Arc<dyn LifecycleExtension>> {
        match self {
            Self::Minimal(_) => None,
            Self::Full(e) => Some(e.clone()),
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginInstance::{:?}", self.tier())
    }
}
