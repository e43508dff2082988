//! extgate-plugins — plugin discovery, lifecycle and ingestion fan-out
//!
//! Plugin code is compiled in and listed in a [`ModuleCatalog`]; each
//! directory under the plugin root carries a `manifest.json` that selects a
//! module by entry point. The [`PluginLoader`] drives every candidate
//! through its lifecycle and registers its tools in the shared
//! [`extgate_tools::DispatchTable`].

pub mod bus;
pub mod catalog;
pub mod context;
pub mod instance;
pub mod loader;
pub mod manifest;

pub use bus::{DeliveryReport, IngestionBus};
pub use catalog::{ModuleCatalog, PluginModule, RegisterFn};
pub use context::{HmacKeyProvider, PluginContext, SecurityProvider};
pub use instance::{LifecycleExtension, PluginInstance, Tier, ToolProvider};
pub use loader::{PluginLoader, PluginState, PluginStatus};
pub use manifest::{Manifest, DEFAULT_ENTRY_POINT, MANIFEST_FILE};
