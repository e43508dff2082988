//! Plugin modules compiled into the `extgate` binary
//!
//! `journal` keeps every ingested payload in the Nexus and exposes two
//! read tools over it. A plugin directory activates it with
//! `{ "entry_point": "journal" }`.

use extgate_core::Metadata;
use extgate_plugins::{LifecycleExtension, ModuleCatalog, PluginContext, PluginInstance, ToolProvider};
use extgate_tools::{ToolHandler, ToolSpec};
use serde_json::{json, Value};

pub const JOURNAL_ENTRY_POINT: &str = "journal";

const DEFAULT_RECENT: i64 = 10;

/// Catalog of every built-in module.
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with(JOURNAL_ENTRY_POINT, |_, ctx| Ok(PluginInstance::full(Journal { ctx })))
}

struct Journal {
    ctx: PluginContext,
}

impl ToolProvider for Journal {
    fn get_tools(&self) -> Vec<ToolSpec> {
        let recent_ctx = self.ctx.clone();
        let count_ctx = self.ctx.clone();
        vec![
            ToolSpec::new(
                "journal_recent",
                "Most recent ingested payloads, newest first",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer", "description": "Max entries (default 10)" }
                    },
                    "additionalProperties": false
                }),
                ToolHandler::suspending(move |args: Value, _| {
                    let ctx = recent_ctx.clone();
                    async move {
                        let limit = args["limit"].as_i64().unwrap_or(DEFAULT_RECENT).max(1);
                        let rows = ctx
                            .query(
                                "SELECT body, metadata, received_at FROM journal \
                                 WHERE plugin_id = ?1 ORDER BY id DESC LIMIT ?2",
                                vec![json!(ctx.plugin_id()), json!(limit)],
                            )
                            .await?;
                        Ok(json!({ "entries": rows }))
                    }
                }),
            ),
            ToolSpec::new(
                "journal_count",
                "Number of payloads recorded so far",
                json!({ "type": "object" }),
                ToolHandler::suspending(move |_, _| {
                    let ctx = count_ctx.clone();
                    async move {
                        let rows = ctx
                            .query(
                                "SELECT COUNT(*) AS n FROM journal WHERE plugin_id = ?1",
                                vec![json!(ctx.plugin_id())],
                            )
                            .await?;
                        let n = rows.first().and_then(|r| r.get("n").cloned()).unwrap_or(json!(0));
                        Ok(json!({ "count": n }))
                    }
                }),
            ),
        ]
    }
}

#[async_trait::async_trait]
impl LifecycleExtension for Journal {
    async fn on_startup(&self) -> anyhow::Result<()> {
        self.ctx
            .execute(
                "CREATE TABLE IF NOT EXISTS journal (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plugin_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    received_at TEXT NOT NULL
                )",
                vec![],
            )
            .await?;
        Ok(())
    }

    async fn on_ingestion(&self, raw_payload: &str, metadata: &Metadata) -> anyhow::Result<()> {
        self.ctx
            .execute(
                "INSERT INTO journal (plugin_id, body, metadata, received_at) VALUES (?1, ?2, ?3, ?4)",
                vec![
                    json!(self.ctx.plugin_id()),
                    json!(raw_payload),
                    json!(serde_json::to_string(metadata)?),
                    json!(chrono::Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }
}
