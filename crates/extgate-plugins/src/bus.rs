//! Ingestion broadcast bus
//!
//! One event in, one `on_ingestion` call per eligible plugin out. Each hook
//! runs in its own task with its own timeout; whatever it returns, raises
//! or panics stays with that plugin.

use crate::loader::PluginLoader;
use extgate_core::IngestionEvent;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one fan-out, for callers that wait on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub targeted: usize,
    pub succeeded: usize,
    /// Plugin ids whose hook errored, panicked or timed out.
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct IngestionBus {
    loader: Arc<PluginLoader>,
    hook_timeout: Duration,
}

impl IngestionBus {
    pub fn new(loader: Arc<PluginLoader>, hook_timeout: Duration) -> Self {
        Self { loader, hook_timeout }
    }

    /// Fire-and-forget. Returns how many plugins were targeted.
    pub fn publish(&self, event: IngestionEvent) -> usize {
        let targeted = self.loader.ingestion_targets().len();
        let bus = self.clone();
        tokio::spawn(async move {
            bus.deliver(event).await;
        });
        targeted
    }

    /// Fan out and wait until every hook has finished or timed out.
    pub async fn deliver(&self, event: IngestionEvent) -> DeliveryReport {
        let targets = self.loader.ingestion_targets();
        let event = Arc::new(event);
        debug!(targets = targets.len(), bytes = event.raw_payload.len(), "Broadcasting ingestion event");

        let calls = targets.into_iter().map(|(plugin_id, ext)| {
            let event = event.clone();
            let limit = self.hook_timeout;
            async move {
                let task = tokio::spawn(async move {
                    ext.on_ingestion(&event.raw_payload, &event.metadata).await
                });
                let abort = task.abort_handle();
                let outcome = match tokio::time::timeout(limit, task).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
                    Ok(Err(join_err)) if join_err.is_panic() => Err("hook panicked".to_string()),
                    Ok(Err(_)) => Err("hook aborted".to_string()),
                    Err(_) => {
                        abort.abort();
                        Err(format!("hook timed out after {}s", limit.as_secs()))
                    }
                };
                if let Err(reason) = &outcome {
                    warn!(plugin_id = %plugin_id, "on_ingestion failed: {}", reason);
                }
                (plugin_id, outcome.is_ok())
            }
        });

        let results = join_all(calls).await;
        let mut report = DeliveryReport {
            targeted: results.len(),
            ..Default::default()
        };
        for (plugin_id, ok) in results {
            if ok {
                report.succeeded += 1;
            } else {
                report.failed.push(plugin_id);
            }
        }
        report
    }
}
