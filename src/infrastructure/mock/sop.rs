//! Mock `SopBridge` and `SopExecutor`: a small table mapping RCA pattern
//! ids to candidate remediation procedures, and an executor that hands back
//! a synthetic execution handle without touching anything real.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::domain::models::{MatchType, MatchedSOP, RCAResult};
use crate::domain::ports::{ExecutionContext, ExecutionHandle, SopBridge, SopExecutor, SourceFetchError};

struct SopEntry {
    pattern_id: &'static str,
    sop_id: &'static str,
    name: &'static str,
    confidence: f64,
}

fn sop_table() -> &'static [SopEntry] {
    &[
        SopEntry { pattern_id: "cpu_exhaustion", sop_id: "sop-restart-service", name: "Restart affected service", confidence: 0.92 },
        SopEntry { pattern_id: "memory_pressure", sop_id: "sop-restart-service", name: "Restart affected service", confidence: 0.85 },
        SopEntry { pattern_id: "throttling", sop_id: "sop-scale-capacity", name: "Scale up provisioned capacity", confidence: 0.8 },
        SopEntry { pattern_id: "disk_pressure", sop_id: "sop-scale-capacity", name: "Scale up provisioned capacity", confidence: 0.83 },
        SopEntry { pattern_id: "elevated_errors", sop_id: "sop-failover-traffic", name: "Fail traffic over to standby", confidence: 0.7 },
    ]
}

/// Matches an `RCAResult`'s pattern id against a small keyword table. Mirrors
/// the fast-path of the real bridge; never consults an LLM.
pub struct MockSopBridge {
    overrides: RwLock<Vec<(String, Vec<MatchedSOP>)>>,
}

impl MockSopBridge {
    pub fn new() -> Self {
        Self { overrides: RwLock::new(Vec::new()) }
    }

    /// Forces `match_sops` to return exactly `sops` whenever the result's
    /// `pattern_id` equals `pattern_id`, bypassing the built-in table.
    pub async fn set_override(&self, pattern_id: impl Into<String>, sops: Vec<MatchedSOP>) {
        self.overrides.write().await.push((pattern_id.into(), sops));
    }
}

impl Default for MockSopBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SopBridge for MockSopBridge {
    async fn match_sops(&self, rca: &RCAResult) -> Vec<MatchedSOP> {
        let overrides = self.overrides.read().await;
        if let Some((_, sops)) = overrides.iter().find(|(id, _)| id == &rca.pattern_id) {
            return sops.clone();
        }
        drop(overrides);

        sop_table()
            .iter()
            .filter(|entry| entry.pattern_id == rca.pattern_id)
            .map(|entry| MatchedSOP {
                sop_id: entry.sop_id.to_string(),
                name: entry.name.to_string(),
                severity: rca.severity,
                match_confidence: entry.confidence,
                match_type: MatchType::Keyword,
                auto_execute: false,
                risk_level: None,
            })
            .collect()
    }
}

/// Hands back a synthetic, monotonically increasing execution id instead of
/// actually invoking anything. `fail_sop_id` lets a test force a specific SOP
/// to fail at start.
pub struct MockSopExecutor {
    counter: AtomicU64,
    fail_sop_id: RwLock<Option<String>>,
}

impl MockSopExecutor {
    pub fn new() -> Self {
        Self { counter: AtomicU64::new(0), fail_sop_id: RwLock::new(None) }
    }

    pub async fn set_failure(&self, sop_id: Option<String>) {
        *self.fail_sop_id.write().await = sop_id;
    }
}

impl Default for MockSopExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SopExecutor for MockSopExecutor {
    async fn start(
        &self,
        sop_id: &str,
        _context: ExecutionContext,
    ) -> Result<ExecutionHandle, SourceFetchError> {
        if let Some(failing) = self.fail_sop_id.read().await.as_deref() {
            if failing == sop_id {
                return Err(SourceFetchError(format!("execution rejected for {sop_id}")));
            }
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionHandle { execution_id: format!("exec-{sop_id}-{n}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;

    fn rca(pattern_id: &str) -> RCAResult {
        RCAResult {
            pattern_id: pattern_id.to_string(),
            pattern_name: "x".into(),
            root_cause: "x".into(),
            severity: Severity::High,
            confidence: 0.9,
            matched_symptoms: vec![],
            evidence: vec![],
            affected_resources: vec![],
            remediation: None,
            model_id: "m".into(),
        }
    }

    #[tokio::test]
    async fn matches_known_pattern() {
        let bridge = MockSopBridge::new();
        let sops = bridge.match_sops(&rca("cpu_exhaustion")).await;
        assert_eq!(sops.len(), 1);
        assert_eq!(sops[0].sop_id, "sop-restart-service");
    }

    #[tokio::test]
    async fn unknown_pattern_matches_nothing() {
        let bridge = MockSopBridge::new();
        assert!(bridge.match_sops(&rca("unknown")).await.is_empty());
    }

    #[tokio::test]
    async fn executor_assigns_increasing_ids() {
        let executor = MockSopExecutor::new();
        let ctx = ExecutionContext {
            rca_pattern_id: "cpu_exhaustion".into(),
            root_cause: "x".into(),
            snapshot_id: None,
            triggered_by: "test".into(),
        };
        let first = executor.start("sop-restart-service", ctx.clone()).await.unwrap();
        let second = executor.start("sop-restart-service", ctx).await.unwrap();
        assert_ne!(first.execution_id, second.execution_id);
    }

    #[tokio::test]
    async fn executor_honors_forced_failure() {
        let executor = MockSopExecutor::new();
        executor.set_failure(Some("sop-restart-service".into())).await;
        let ctx = ExecutionContext {
            rca_pattern_id: "cpu_exhaustion".into(),
            root_cause: "x".into(),
            snapshot_id: None,
            triggered_by: "test".into(),
        };
        assert!(executor.start("sop-restart-service", ctx).await.is_err());
    }
}
