//! Plugin loader — discovery and the per-plugin lifecycle
//!
//! ```text
//! Discovered → ManifestValidated → CodeLoaded → Registered → Active
//!                                                     └─(startup fails)→ ToolsOnly
//! any state ──→ Failed
//! ```
//!
//! Every candidate is isolated: a bad manifest, a missing entry point or a
//! panicking hook fails that plugin only, and the loader moves on.

use crate::catalog::ModuleCatalog;
use crate::context::{PluginContext, SecurityProvider};
use crate::instance::{LifecycleExtension, PluginInstance, Tier};
use crate::manifest::{folder_name, Manifest};
use dashmap::DashMap;
use extgate_core::{GatewayError, PluginConfig, Result};
use extgate_nexus::Nexus;
use extgate_tools::DispatchTable;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Discovered,
    ManifestValidated,
    CodeLoaded,
    Registered,
    Active,
    /// Startup hook failed: tools stay callable, no ingestion events.
    ToolsOnly,
    /// Skipped by manifest `enabled: false` or by config.
    Disabled,
    Failed,
}

impl PluginState {
    /// Loaded far enough that its tools are in the dispatch table.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Active | Self::ToolsOnly)
    }
}

/// One row of the loader's report.
#[derive(Clone, Debug, Serialize)]
pub struct PluginStatus {
    pub plugin_id: String,
    pub state: PluginState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub root: PathBuf,
}

impl PluginStatus {
    fn new(plugin_id: impl Into<String>, root: &Path) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            state: PluginState::Discovered,
            tier: None,
            version: None,
            tools: Vec::new(),
            error: None,
            root: root.to_path_buf(),
        }
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(plugin_id = %self.plugin_id, from = ?self.state, "Plugin failed: {}", reason);
        self.state = PluginState::Failed;
        self.error = Some(reason);
        self
    }

    fn advance(&mut self, next: PluginState) {
        debug!(plugin_id = %self.plugin_id, from = ?self.state, to = ?next, "Plugin state");
        self.state = next;
    }
}

struct PluginRecord {
    status: PluginStatus,
    instance: Option<PluginInstance>,
}

pub struct PluginLoader {
    catalog: ModuleCatalog,
    table: Arc<DispatchTable>,
    nexus: Nexus,
    security: Option<Arc<dyn SecurityProvider>>,
    disabled: GlobSet,
    startup_timeout: Duration,
    records: DashMap<String, PluginRecord>,
    /// Serializes load/reload/unload so tool registration order is deterministic.
    lifecycle: tokio::sync::Mutex<()>,
}

impl PluginLoader {
    pub fn new(
        catalog: ModuleCatalog,
        table: Arc<DispatchTable>,
        nexus: Nexus,
        config: &PluginConfig,
    ) -> Result<Self> {
        debug!(modules = catalog.len(), "Plugin catalog ready");
        Ok(Self {
            catalog,
            table,
            nexus,
            security: None,
            disabled: build_globset(&config.disabled)?,
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
            records: DashMap::new(),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_security(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(provider);
        self
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    /// Candidate plugin directories under `dir`, sorted by name.
    pub fn discover(dir: &Path) -> Vec<PathBuf> {
        if !dir.is_dir() {
            warn!("Plugin directory {} does not exist", dir.display());
            return Vec::new();
        }
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    warn!("Skipping unreadable plugin entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_dir())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.into_path())
            .collect()
    }

    /// Load every plugin directory under `dir` in name order.
    pub async fn load_all(&self, dir: &Path) -> Vec<PluginStatus> {
        let candidates = Self::discover(dir);
        info!("Discovered {} plugin candidate(s) in {}", candidates.len(), dir.display());
        let mut report = Vec::with_capacity(candidates.len());
        for path in candidates {
            report.push(self.load_one(&path).await);
        }
        let active = report.iter().filter(|s| s.state.is_loaded()).count();
        info!(active, total = report.len(), "Plugin load complete");
        report
    }

    /// Load one plugin directory. A no-op if that plugin is already loaded.
    pub async fn load_one(&self, path: &Path) -> PluginStatus {
        let _guard = self.lifecycle.lock().await;
        self.load_locked(path, false, None).await
    }

    /// Forced reload: tear down the plugin's record and tools, then run the
    /// whole lifecycle again from its directory.
    ///
    /// No shutdown hook is called on the previous instance. If the new run
    /// fails before the manifest yields an id, the failure is recorded under
    /// `plugin_id`.
    pub async fn reload(&self, plugin_id: &str) -> Result<PluginStatus> {
        let _guard = self.lifecycle.lock().await;
        let (_, old) = self
            .records
            .remove(plugin_id)
            .ok_or_else(|| GatewayError::PluginNotFound(plugin_id.to_string()))?;
        info!(plugin_id = %plugin_id, "Reloading plugin");
        self.table.unregister_origin(plugin_id);
        let root = old.status.root;
        Ok(self.load_locked(&root, true, Some(plugin_id)).await)
    }

    /// Remove a plugin and every tool it registered. Returns the number of tools removed.
    pub async fn unload(&self, plugin_id: &str) -> Result<usize> {
        let _guard = self.lifecycle.lock().await;
        if self.records.remove(plugin_id).is_none() {
            return Err(GatewayError::PluginNotFound(plugin_id.to_string()));
        }
        let removed = self.table.unregister_origin(plugin_id);
        info!(plugin_id = %plugin_id, removed, "Plugin unloaded");
        Ok(removed)
    }

    pub fn status(&self, plugin_id: &str) -> Option<PluginStatus> {
        self.records.get(plugin_id).map(|r| r.status.clone())
    }

    /// Report rows for every candidate seen so far, sorted by id.
    pub fn statuses(&self) -> Vec<PluginStatus> {
        let mut all: Vec<_> = self.records.iter().map(|r| r.status.clone()).collect();
        all.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        all
    }

    /// Full-tier plugins that completed startup.
    pub fn ingestion_targets(&self) -> Vec<(String, Arc<dyn LifecycleExtension>)> {
        let mut targets: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.status.state == PluginState::Active)
            .filter_map(|r| {
                let ext = r.instance.as_ref()?.lifecycle()?;
                Some((r.key().clone(), ext))
            })
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets
    }

    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.status.state.is_loaded()).count()
    }

    fn is_disabled(&self, manifest: &Manifest) -> bool {
        !manifest.enabled || self.disabled.is_match(&manifest.plugin_id)
    }

    /// `known_id` is the id a forced reload is re-running; manifest failures
    /// are recorded under it instead of the folder name.
    async fn load_locked(&self, path: &Path, force: bool, known_id: Option<&str>) -> PluginStatus {
        let key = known_id.map(str::to_string).unwrap_or_else(|| folder_name(path));
        let mut status = PluginStatus::new(&key, path);

        // Discovered → ManifestValidated
        let manifest = match Manifest::from_dir(path) {
            Ok(m) => m,
            Err(e) => {
                let status = status.fail(e.to_string());
                self.store(&key, status.clone(), None);
                return status;
            }
        };
        status.plugin_id = manifest.plugin_id.clone();
        status.version = Some(manifest.version.clone());
        let id = manifest.plugin_id.clone();

        if let Some(existing) = self.records.get(&id) {
            if existing.status.root != path {
                if existing.status.state.is_loaded() {
                    return status.fail(format!(
                        "plugin id already provided by {}",
                        existing.status.root.display()
                    ));
                }
            } else if existing.status.state.is_loaded() && !force {
                debug!(plugin_id = %id, "Plugin already loaded, skipping");
                return existing.status.clone();
            }
        }

        // Whatever was registered under this id before is replaced.
        self.table.unregister_origin(&id);

        if self.is_disabled(&manifest) {
            info!(plugin_id = %id, "Plugin disabled, skipping");
            status.advance(PluginState::Disabled);
            self.store(&id, status.clone(), None);
            return status;
        }
        status.advance(PluginState::ManifestValidated);

        // ManifestValidated → CodeLoaded
        let Some(module) = self.catalog.get(&manifest.entry_point) else {
            let status = status.fail(format!(
                "no module for entry point '{}' (known: {})",
                manifest.entry_point,
                self.catalog.entry_points().join(", ")
            ));
            self.store(&id, status.clone(), None);
            return status;
        };
        let Some(hook) = module.register.clone() else {
            let status = status.fail("module has no registration hook");
            self.store(&id, status.clone(), None);
            return status;
        };
        status.advance(PluginState::CodeLoaded);

        // CodeLoaded → Registered
        let ctx = PluginContext::new(&id, self.nexus.clone(), self.security.clone());
        let instance = match std::panic::catch_unwind(AssertUnwindSafe(|| hook(&manifest, ctx))) {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => {
                let status = status.fail(format!("registration failed: {:#}", e));
                self.store(&id, status.clone(), None);
                return status;
            }
            Err(panic) => {
                let status = status.fail(format!("registration panicked: {}", panic_message(panic.as_ref())));
                self.store(&id, status.clone(), None);
                return status;
            }
        };
        let specs = match std::panic::catch_unwind(AssertUnwindSafe(|| instance.get_tools())) {
            Ok(specs) => specs,
            Err(panic) => {
                let status = status.fail(format!("get_tools panicked: {}", panic_message(panic.as_ref())));
                self.store(&id, status.clone(), None);
                return status;
            }
        };
        status.tools = self.table.register_all(&id, specs);
        status.tier = Some(instance.tier());
        status.advance(PluginState::Registered);

        // Registered → Active (or ToolsOnly)
        match instance.lifecycle() {
            None => status.advance(PluginState::Active),
            Some(ext) => match self.run_startup(&id, ext).await {
                Ok(()) => status.advance(PluginState::Active),
                Err(reason) => {
                    warn!(plugin_id = %id, "Startup failed, demoting to tools-only: {}", reason);
                    status.error = Some(reason);
                    status.advance(PluginState::ToolsOnly);
                }
            },
        }

        info!(
            plugin_id = %id,
            state = ?status.state,
            tools = status.tools.len(),
            "Plugin loaded"
        );
        self.store(&id, status.clone(), Some(instance));
        status
    }

    async fn run_startup(
        &self,
        plugin_id: &str,
        ext: Arc<dyn LifecycleExtension>,
    ) -> std::result::Result<(), String> {
        let task = tokio::spawn(async move { ext.on_startup().await });
        let abort = task.abort_handle();
        match tokio::time::timeout(self.startup_timeout, task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
            Ok(Err(join_err)) if join_err.is_panic() => Err("on_startup panicked".into()),
            Ok(Err(_)) => Err("on_startup aborted".into()),
            Err(_) => {
                abort.abort();
                debug!(plugin_id = %plugin_id, "on_startup timed out");
                Err(format!(
                    "on_startup timed out after {}s",
                    self.startup_timeout.as_secs()
                ))
            }
        }
    }

    fn store(&self, key: &str, status: PluginStatus, instance: Option<PluginInstance>) {
        self.records
            .insert(key.to_string(), PluginRecord { status, instance });
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| GatewayError::Config(format!("bad disabled pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GatewayError::Config(format!("disabled patterns: {}", e)))
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_globs() {
        let set = build_globset(&["legacy-*".into(), "scratch".into()]).unwrap();
        assert!(set.is_match("legacy-ocr"));
        assert!(set.is_match("scratch"));
        assert!(!set.is_match("weather"));
    }

    #[test]
    fn bad_glob_is_config_error() {
        let err = build_globset(&["[".into()]).unwrap_err();
        assert_eq!(err.kind(), extgate_core::ErrorKind::Config);
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }

    #[test]
    fn discover_sorts_and_skips_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", ".hidden"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("README"), "x").unwrap();
        let found: Vec<_> = PluginLoader::discover(dir.path())
            .iter()
            .map(|p| folder_name(p))
            .collect();
        assert_eq!(found, vec!["alpha", "zeta"]);
    }
}
