//! Mock `RcaAnalyzer`: a small pattern table standing in for the real
//! fast-path matcher + LLM deep-path + knowledge-base enrichment described
//! in spec §4.4 Stage 2. Never fails — on no match it returns a low-
//! confidence "unknown" result, per the analyzer's external contract (§6.2).

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::models::{CorrelatedEvent, RCAResult, Remediation, Severity};
use crate::domain::ports::{KnowledgeBase, RcaAnalyzer, SearchStrategy};

/// One entry in the fast-path pattern table: fires when `anomaly_type`
/// substring-matches an observed anomaly.
struct PatternEntry {
    anomaly_substr: &'static str,
    pattern_id: &'static str,
    pattern_name: &'static str,
    root_cause: &'static str,
    severity: Severity,
    base_confidence: f64,
    action: &'static str,
    auto_execute: bool,
}

fn pattern_table() -> &'static [PatternEntry] {
    &[
        PatternEntry {
            anomaly_substr: "CPUUtilization",
            pattern_id: "cpu_exhaustion",
            pattern_name: "CPU exhaustion",
            root_cause: "a runaway process or undersized instance class is saturating CPU",
            severity: Severity::High,
            base_confidence: 0.9,
            action: "restart_service",
            auto_execute: false,
        },
        PatternEntry {
            anomaly_substr: "MemoryUtilization",
            pattern_id: "memory_pressure",
            pattern_name: "Memory pressure",
            root_cause: "a memory leak or undersized instance is exhausting available memory",
            severity: Severity::Medium,
            base_confidence: 0.8,
            action: "restart_service",
            auto_execute: false,
        },
        PatternEntry {
            anomaly_substr: "ThrottledRequests",
            pattern_id: "throttling",
            pattern_name: "Request throttling",
            root_cause: "the resource is hitting a provisioned-throughput or API rate limit",
            severity: Severity::Medium,
            base_confidence: 0.75,
            action: "scale_capacity",
            auto_execute: false,
        },
        PatternEntry {
            anomaly_substr: "DiskSpaceUtilization",
            pattern_id: "disk_pressure",
            pattern_name: "Disk space pressure",
            root_cause: "log or data growth is approaching the volume's capacity",
            severity: Severity::Medium,
            base_confidence: 0.82,
            action: "scale_capacity",
            auto_execute: false,
        },
        PatternEntry {
            anomaly_substr: "Errors",
            pattern_id: "elevated_errors",
            pattern_name: "Elevated error rate",
            root_cause: "a recent deployment or dependency failure is producing elevated errors",
            severity: Severity::High,
            base_confidence: 0.68,
            action: "failover_traffic",
            auto_execute: false,
        },
    ]
}

/// Confidence floor below which the mock "escalates" to a simulated
/// higher-reasoning pass, per spec §4.2's auto-escalation contract.
const ESCALATION_THRESHOLD: f64 = 0.70;
/// How much the simulated deep-reasoning pass raises confidence.
const ESCALATION_BOOST: f64 = 0.15;

/// Deterministic mock root-cause analyzer: matches the correlator's derived
/// anomalies against a small fast-path pattern table, optionally enriching
/// via a `KnowledgeBase` search, and escalates low-confidence matches the
/// way the real analyzer's LLM deep-path would.
pub struct MockRcaAnalyzer {
    knowledge_base: Option<Arc<dyn KnowledgeBase>>,
}

impl MockRcaAnalyzer {
    pub fn new() -> Self {
        Self { knowledge_base: None }
    }

    pub fn with_knowledge_base(knowledge_base: Arc<dyn KnowledgeBase>) -> Self {
        Self { knowledge_base: Some(knowledge_base) }
    }

    fn unknown_result(&self) -> RCAResult {
        RCAResult {
            pattern_id: "unknown".to_string(),
            pattern_name: "No pattern matched".to_string(),
            root_cause: "no anomaly in the collected telemetry matched a known pattern"
                .to_string(),
            severity: Severity::Low,
            confidence: 0.2,
            matched_symptoms: vec![],
            evidence: vec![],
            affected_resources: vec![],
            remediation: None,
            model_id: "mock-rca-fastpath".to_string(),
        }
    }
}

impl Default for MockRcaAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RcaAnalyzer for MockRcaAnalyzer {
    async fn analyze(&self, event: &CorrelatedEvent) -> RCAResult {
        let Some(anomaly) = event.anomalies.first() else {
            return self.unknown_result();
        };

        let Some(entry) = pattern_table()
            .iter()
            .find(|e| anomaly.anomaly_type.contains(e.anomaly_substr))
        else {
            return self.unknown_result();
        };

        let mut confidence = entry.base_confidence;
        let mut model_id = "mock-rca-fastpath".to_string();

        if let Some(kb) = &self.knowledge_base {
            let query = format!("{} {}", entry.pattern_id, anomaly.resource);
            let hits = kb.search(&query, SearchStrategy::Auto).await;
            if !hits.hits.is_empty() {
                confidence = (confidence + 0.05).min(1.0);
            }
        }

        if confidence < ESCALATION_THRESHOLD {
            confidence = (confidence + ESCALATION_BOOST).min(1.0);
            model_id = "mock-rca-deep-reasoning".to_string();
        }

        let affected_resources: Vec<String> = event
            .anomalies
            .iter()
            .filter(|a| a.anomaly_type.contains(entry.anomaly_substr))
            .map(|a| a.resource.clone())
            .collect();

        RCAResult {
            pattern_id: entry.pattern_id.to_string(),
            pattern_name: entry.pattern_name.to_string(),
            root_cause: entry.root_cause.to_string(),
            severity: entry.severity,
            confidence,
            matched_symptoms: vec![anomaly.anomaly_type.clone()],
            evidence: vec![anomaly.description.clone()],
            affected_resources,
            remediation: Some(Remediation {
                action: entry.action.to_string(),
                auto_execute: entry.auto_execute,
                params: serde_json::json!({ "resource": anomaly.resource }),
                conditions: vec![],
                rollback: None,
                suggestion: None,
                checklist: None,
                fallback: None,
            }),
            model_id,
        }
    }
}
