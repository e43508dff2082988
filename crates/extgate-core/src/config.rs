//! Gateway configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Plugin discovery and lifecycle.
    pub plugins: PluginConfig,
    /// Tool dispatch limits.
    pub tools: ToolConfig,
    /// Session lifetime and scratchpad limits.
    pub sessions: SessionConfig,
    /// Shared store location and retry policy.
    pub nexus: NexusConfig,
    /// Authentication provider settings.
    pub auth: AuthConfig,
    /// Trust guardrail settings.
    pub guardrail: GuardrailConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory scanned for plugin folders (each holding a manifest.json).
    pub dir: PathBuf,
    /// Glob patterns of plugin ids that are never loaded.
    pub disabled: Vec<String>,
    /// Upper bound for a Full-tier startup hook.
    pub startup_timeout_secs: u64,
    /// Upper bound for one ingestion hook delivery.
    pub ingestion_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Upper bound for a single tool invocation.
    pub timeout_secs: u64,
    /// Immediate handlers allowed on the blocking pool at once.
    pub max_blocking: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime from creation.
    pub ttl_secs: u64,
    /// How often the background sweeper drops expired sessions.
    pub sweep_interval_secs: u64,
    /// Maximum number of keys in one session scratchpad.
    pub max_scratchpad_entries: usize,
}

/// Database file used when the config names none.
pub const DEFAULT_NEXUS_PATH: &str = "extgate.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    /// SQLite database file, opened in WAL mode. `None` means a private
    /// in-memory store, which only tests should ask for.
    pub path: Option<PathBuf>,
    /// Retry attempts on a busy/locked store before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (milliseconds).
    pub max_delay_ms: u64,
}

/// Authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
}

/// Authentication mode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Upper bound for one signal provider call (milliseconds).
    pub signal_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files. Stderr only when unset.
    pub dir: Option<PathBuf>,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            disabled: Vec::new(),
            startup_timeout_secs: 10,
            ingestion_timeout_secs: 30,
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_blocking: 64,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            sweep_interval_secs: 60,
            max_scratchpad_entries: 256,
        }
    }
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from(DEFAULT_NEXUS_PATH)),
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            signal_timeout_ms: 2_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: "extgate=info".to_string(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl GatewayConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply `EXTGATE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("EXTGATE_TOKEN") {
            self.auth.token = Some(token);
        }
        if let Ok(dir) = std::env::var("EXTGATE_PLUGIN_DIR") {
            self.plugins.dir = PathBuf::from(dir);
        }
        if let Ok(db) = std::env::var("EXTGATE_DB") {
            self.nexus.path = Some(PathBuf::from(db));
        }
        self
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
