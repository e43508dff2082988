//! Gateway façade — owns every component and wires the call path
//!
//! call_tool: resolve session → dispatch (validate, run) → guardrail → response.
//! ingest: event → bus → every Active Full-tier plugin.

use crate::auth::{Authenticator, Credentials, TokenAuthenticator};
use crate::guardrail::{SignalProvider, TrustGuardrail};
use crate::session::{SessionInfo, SessionManager};
use chrono::{DateTime, Utc};
use extgate_core::{GatewayConfig, IngestionEvent, Result, SessionKey, ToolResponse};
use extgate_nexus::Nexus;
use extgate_plugins::{
    DeliveryReport, HmacKeyProvider, IngestionBus, ModuleCatalog, PluginLoader, PluginStatus,
    SecurityProvider,
};
use extgate_tools::{create_dispatch_table, DispatchTable, Invocation, ToolDefinition};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct GatewayBuilder {
    config: GatewayConfig,
    catalog: ModuleCatalog,
    nexus: Option<Nexus>,
    authenticator: Option<Arc<dyn Authenticator>>,
    signal_provider: Option<Arc<dyn SignalProvider>>,
    security: Option<Arc<dyn SecurityProvider>>,
    session_ttl: Option<Duration>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            catalog: ModuleCatalog::new(),
            nexus: None,
            authenticator: None,
            signal_provider: None,
            security: None,
            session_ttl: None,
        }
    }

    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn nexus(mut self, nexus: Nexus) -> Self {
        self.nexus = Some(nexus);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn signal_provider(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.signal_provider = Some(provider);
        self
    }

    pub fn security(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.security = Some(provider);
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let config = self.config;

        let nexus = match self.nexus {
            Some(n) => n,
            None => Nexus::from_config(&config.nexus)?,
        };

        let table = Arc::new(
            create_dispatch_table(Duration::from_secs(config.tools.timeout_secs))
                .with_blocking_limit(config.tools.max_blocking),
        );

        let security: Arc<dyn SecurityProvider> = match self.security {
            Some(s) => s,
            None => Arc::new(HmacKeyProvider::generate()?),
        };
        let loader = Arc::new(
            PluginLoader::new(self.catalog, table.clone(), nexus.clone(), &config.plugins)?
                .with_security(security),
        );

        let authenticator: Arc<dyn Authenticator> = match self.authenticator {
            Some(a) => a,
            None => Arc::new(TokenAuthenticator::from_config(&config.auth)),
        };
        let mut sessions = SessionManager::new(authenticator, &config.sessions);
        if let Some(ttl) = self.session_ttl {
            sessions = sessions.with_ttl(ttl);
        }

        let bus = IngestionBus::new(
            loader.clone(),
            Duration::from_secs(config.plugins.ingestion_timeout_secs),
        );
        let guardrail = TrustGuardrail::new(
            self.signal_provider,
            Duration::from_millis(config.guardrail.signal_timeout_ms),
        );

        Ok(Gateway {
            config,
            nexus,
            table,
            loader,
            sessions: Arc::new(sessions),
            bus,
            guardrail,
            started_at: Utc::now(),
        })
    }
}

pub struct Gateway {
    config: GatewayConfig,
    nexus: Nexus,
    table: Arc<DispatchTable>,
    loader: Arc<PluginLoader>,
    sessions: Arc<SessionManager>,
    bus: IngestionBus,
    guardrail: TrustGuardrail,
    started_at: DateTime<Utc>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn nexus(&self) -> &Nexus {
        &self.nexus
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Load every plugin under `plugins.dir`.
    pub async fn load_plugins(&self) -> Vec<PluginStatus> {
        self.loader.load_all(&self.config.plugins.dir).await
    }

    // -- sessions ------------------------------------------------------------

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SessionInfo> {
        self.sessions.authenticate(credentials).await
    }

    pub fn logout(&self, session: &SessionKey) -> bool {
        self.sessions.logout(session)
    }

    // -- tools ---------------------------------------------------------------

    /// Tool catalogue visible to an authenticated session.
    pub fn tools(&self, session: &SessionKey) -> Result<Arc<Vec<ToolDefinition>>> {
        self.sessions.resolve(session)?;
        Ok(self.table.definitions())
    }

    pub async fn call_tool(&self, session: &SessionKey, tool: &str, args: Value) -> Result<ToolResponse> {
        self.call_tool_cancellable(session, tool, args, CancellationToken::new())
            .await
    }

    /// Errors return before the guardrail; only successful results are scored.
    pub async fn call_tool_cancellable(
        &self,
        session: &SessionKey,
        tool: &str,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<ToolResponse> {
        let scratchpad = self.sessions.scratchpad(session)?;
        let call = Invocation {
            session: Some(session.clone()),
            scratchpad: Some(scratchpad),
        };
        let output = self.table.invoke_cancellable(tool, args, call, cancel).await?;
        let response = ToolResponse::ok(output.tool, output.origin, output.value);
        Ok(self.guardrail.intercept(response).await)
    }

    // -- ingestion -----------------------------------------------------------

    /// Fire-and-forget broadcast. Returns the number of plugins targeted.
    pub fn ingest(&self, event: IngestionEvent) -> usize {
        self.bus.publish(event)
    }

    /// Broadcast and wait for every hook to finish.
    pub async fn ingest_and_wait(&self, event: IngestionEvent) -> DeliveryReport {
        self.bus.deliver(event).await
    }

    // -- plugins -------------------------------------------------------------

    pub fn plugins(&self) -> Vec<PluginStatus> {
        self.loader.statuses()
    }

    pub async fn reload_plugin(&self, plugin_id: &str) -> Result<PluginStatus> {
        self.loader.reload(plugin_id).await
    }

    pub async fn unload_plugin(&self, plugin_id: &str) -> Result<usize> {
        self.loader.unload(plugin_id).await
    }

    // -- housekeeping --------------------------------------------------------

    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let every = Duration::from_secs(self.config.sessions.sweep_interval_secs.max(1));
        info!("Session sweeper every {}s", every.as_secs());
        self.sessions.spawn_sweeper(every, shutdown)
    }

    pub fn health(&self) -> Value {
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": (Utc::now() - self.started_at).num_seconds(),
            "tools": self.table.len(),
            "plugins_active": self.loader.active_count(),
            "sessions": self.sessions.active_count(),
            "guardrail": if self.guardrail.has_provider() { "active" } else { "degraded" },
        })
    }
}
