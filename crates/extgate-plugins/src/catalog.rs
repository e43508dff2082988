//! Compiled-in plugin modules, keyed by entry-point name
//!
//! A plugin directory on disk only selects code: its manifest's
//! `entry_point` is looked up here. A module may exist without a
//! registration hook; the loader skips such plugins.

use crate::context::PluginContext;
use crate::instance::PluginInstance;
use crate::manifest::Manifest;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `register_extension(manifest, context) -> PluginInstance`
pub type RegisterFn =
    Arc<dyn Fn(&Manifest, PluginContext) -> anyhow::Result<PluginInstance> + Send + Sync>;

#[derive(Clone)]
pub struct PluginModule {
    pub entry_point: String,
    pub register: Option<RegisterFn>,
}

#[derive(Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, PluginModule>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module with a registration hook. Replaces any module with the same name.
    pub fn register<F>(&mut self, entry_point: impl Into<String>, hook: F)
    where
        F: Fn(&Manifest, PluginContext) -> anyhow::Result<PluginInstance> + Send + Sync + 'static,
    {
        let entry_point = entry_point.into();
        self.modules.insert(
            entry_point.clone(),
            PluginModule {
                entry_point,
                register: Some(Arc::new(hook)),
            },
        );
    }

    /// Builder form of [`ModuleCatalog::register`].
    pub fn with<F>(mut self, entry_point: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Manifest, PluginContext) -> anyhow::Result<PluginInstance> + Send + Sync + 'static,
    {
        self.register(entry_point, hook);
        self
    }

    /// Add a module that resolves but exposes no registration hook.
    pub fn insert_module(&mut self, module: PluginModule) {
        self.modules.insert(module.entry_point.clone(), module);
    }

    pub fn get(&self, entry_point: &str) -> Option<&PluginModule> {
        self.modules.get(entry_point)
    }

    /// Known entry points, sorted.
    pub fn entry_points(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}
