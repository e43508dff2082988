//! Trust guardrail — veracity verdict and warning injection on tool results
//!
//! Runs only on successful results. Signals come from an external
//! [`SignalProvider`]; this module only scores and marks. Without usable
//! signals the result passes through untouched and `GuardrailDegraded` is
//! logged.

use extgate_core::{content_string, Recommendation, ToolResponse, TrustVerdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Results scoring below this are prefixed with [`WARNING_MARKER`].
pub const TRUST_THRESHOLD: f64 = 60.0;

/// Below this the recommendation is `reject` rather than `warn`.
pub const REJECT_BELOW: f64 = 30.0;

pub const WARNING_MARKER: &str =
    "**⚠ LOW TRUST: this content scored below the veracity threshold. Verify it before relying on it.**\n\n";

/// Signal bundle from the provider, each component in 0..=1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VeracitySignals {
    pub entropy: f64,
    pub burstiness: f64,
    /// Closeness to known synthetic patterns. Higher is worse.
    pub vault_proximity: f64,
    pub source_reliability: f64,
}

impl VeracitySignals {
    /// Components clamped to 0..=1; non-finite values count as 0.
    pub fn clamped(&self) -> Self {
        Self {
            entropy: unit(self.entropy),
            burstiness: unit(self.burstiness),
            vault_proximity: unit(self.vault_proximity),
            source_reliability: unit(self.source_reliability),
        }
    }

    /// Weighted score in 0..=100.
    pub fn score(&self) -> f64 {
        let s = self.clamped();
        100.0
            * (0.35 * s.source_reliability
                + 0.30 * (1.0 - s.vault_proximity)
                + 0.20 * s.burstiness
                + 0.15 * s.entropy)
    }

    fn as_map(&self) -> BTreeMap<String, f64> {
        let s = self.clamped();
        BTreeMap::from([
            ("burstiness".to_string(), s.burstiness),
            ("entropy".to_string(), s.entropy),
            ("source_reliability".to_string(), s.source_reliability),
            ("vault_proximity".to_string(), s.vault_proximity),
        ])
    }
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn recommend(score: f64) -> Recommendation {
    if score >= TRUST_THRESHOLD {
        Recommendation::Approve
    } else if score >= REJECT_BELOW {
        Recommendation::Warn
    } else {
        Recommendation::Reject
    }
}

pub fn verdict(signals: &VeracitySignals) -> TrustVerdict {
    let score = signals.score();
    TrustVerdict {
        score,
        signals: signals.as_map(),
        recommendation: recommend(score),
        injected: score < TRUST_THRESHOLD,
    }
}

/// Prefix the marker when the verdict says so. Non-string results are
/// rendered as JSON text first.
pub fn apply(result: Value, verdict: &TrustVerdict) -> Value {
    if !verdict.injected {
        return result;
    }
    Value::String(format!("{}{}", WARNING_MARKER, content_string(&result)))
}

/// External veracity signal source.
#[async_trait::async_trait]
pub trait SignalProvider: Send + Sync {
    async fn signals(&self, content: &str) -> anyhow::Result<VeracitySignals>;
}

pub struct TrustGuardrail {
    provider: Option<Arc<dyn SignalProvider>>,
    timeout: Duration,
}

impl TrustGuardrail {
    pub fn new(provider: Option<Arc<dyn SignalProvider>>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Attach a verdict and, below threshold, the warning marker.
    pub async fn intercept(&self, mut response: ToolResponse) -> ToolResponse {
        let Some(provider) = &self.provider else {
            warn!(tool = %response.tool, "GuardrailDegraded: no signal provider configured");
            return response;
        };

        let content = content_string(&response.result);
        let signals = match tokio::time::timeout(self.timeout, provider.signals(&content)).await {
            Ok(Ok(signals)) => signals,
            Ok(Err(e)) => {
                warn!(tool = %response.tool, "GuardrailDegraded: signal provider failed: {:#}", e);
                return response;
            }
            Err(_) => {
                warn!(
                    tool = %response.tool,
                    "GuardrailDegraded: signal provider timed out after {}ms",
                    self.timeout.as_millis()
                );
                return response;
            }
        };

        let v = verdict(&signals);
        debug!(
            tool = %response.tool,
            score = v.score,
            injected = v.injected,
            "Trust verdict"
        );
        response.result = apply(response.result, &v);
        response.trust = Some(v);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signals(e: f64, b: f64, v: f64, r: f64) -> VeracitySignals {
        VeracitySignals { entropy: e, burstiness: b, vault_proximity: v, source_reliability: r }
    }

    #[test]
    fn score_weights() {
        assert!((signals(1.0, 1.0, 0.0, 1.0).score() - 100.0).abs() < 1e-9);
        assert!(signals(0.0, 0.0, 1.0, 0.0).score().abs() < 1e-9);
        assert!((signals(0.0, 0.0, 1.0, 1.0).score() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_signals_are_clamped() {
        let s = signals(5.0, -1.0, f64::NAN, 2.0);
        assert!((s.score() - (35.0 + 30.0 + 15.0)).abs() < 1e-9);
    }

    #[test]
    fn recommendation_bands() {
        assert_eq!(recommend(60.0), Recommendation::Approve);
        assert_eq!(recommend(59.9), Recommendation::Warn);
        assert_eq!(recommend(30.0), Recommendation::Warn);
        assert_eq!(recommend(29.9), Recommendation::Reject);
    }

    #[test]
    fn apply_prefixes_only_when_injected() {
        let low = verdict(&signals(0.0, 0.0, 1.0, 0.0));
        let high = verdict(&signals(1.0, 1.0, 0.0, 1.0));
        let marked = apply(json!("text"), &low);
        assert!(marked.as_str().unwrap().starts_with(WARNING_MARKER));
        assert_eq!(apply(json!("text"), &high), json!("text"));
    }

    #[test]
    fn structured_results_are_rendered_before_marking() {
        let low = verdict(&signals(0.0, 0.0, 1.0, 0.0));
        let marked = apply(json!({ "temp": 21 }), &low);
        let text = marked.as_str().unwrap();
        assert!(text.starts_with(WARNING_MARKER));
        assert!(text.contains("\"temp\": 21"));
    }
}
