//! `IncidentOrchestrator`: fuses collection, analysis, SOP matching, and the
//! safety layer into one `IncidentRecord` per triggered incident.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    CollectionSource, CollectionSummary, DetectResult, ExecutionResult, IncidentRecord,
    IncidentStatus, MatchedSOP, RCAResult, TriggerType,
};
use crate::domain::ports::{ExecutionContext, KnowledgeBase, RcaAnalyzer, SopBridge, SopExecutor};
use crate::services::event_correlator::EventCorrelator;
use crate::services::safety_layer::{classify_risk, SafetyContext, SafetyLayer};

/// Confidence at or above which a low-severity match is auto-executable,
/// per Stage 3's annotation rule.
const AUTO_EXECUTE_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Target end-to-end pipeline duration, per `Stats().target_ms`.
const TARGET_DURATION_MS: u64 = 25_000;

/// Arguments to `handle_incident`. Grouped into a struct rather than eight
/// positional parameters, per the data model's "no untyped bag on public
/// APIs" note — every field here is either a concrete type or an explicit
/// `Option`.
#[derive(Debug, Clone)]
pub struct HandleIncidentParams {
    pub trigger_type: TriggerType,
    pub trigger_data: serde_json::Value,
    pub services: Option<Vec<String>>,
    pub auto_execute: bool,
    pub dry_run: bool,
    pub force: bool,
    pub lookback_minutes: u32,
    pub detect_result: Option<Arc<DetectResult>>,
}

impl Default for HandleIncidentParams {
    fn default() -> Self {
        Self {
            trigger_type: TriggerType::Manual,
            trigger_data: serde_json::json!({}),
            services: None,
            auto_execute: false,
            dry_run: false,
            force: false,
            lookback_minutes: 15,
            detect_result: None,
        }
    }
}

/// Aggregated view returned by `stats`.
#[derive(Debug, Clone)]
pub struct OrchestratorStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub avg_duration_ms: f64,
    pub avg_stage_timings: HashMap<String, f64>,
    pub target_ms: u64,
    pub within_target: bool,
}

/// Executes the six-stage incident pipeline and records the result.
///
/// Holds every external collaborator as a port object so the pipeline can
/// run against mocks or real adapters interchangeably, plus an in-memory
/// `DashMap` index keyed by `incident_id` — chosen over a
/// `RwLock<HashMap<..>>` (the shape `SafetyLayer`'s circuit state uses)
/// because `handle_incident` must be freely reentrant across incidents with
/// no serialization point, which is exactly `DashMap`'s per-shard locking
/// contract.
pub struct IncidentOrchestrator {
    correlator: Arc<EventCorrelator>,
    rca_analyzer: Arc<dyn RcaAnalyzer>,
    sop_bridge: Arc<dyn SopBridge>,
    safety: Arc<SafetyLayer>,
    sop_executor: Arc<dyn SopExecutor>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    region: String,
    incidents: DashMap<Uuid, IncidentRecord>,
}

impl IncidentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlator: Arc<EventCorrelator>,
        rca_analyzer: Arc<dyn RcaAnalyzer>,
        sop_bridge: Arc<dyn SopBridge>,
        safety: Arc<SafetyLayer>,
        sop_executor: Arc<dyn SopExecutor>,
        knowledge_base: Arc<dyn KnowledgeBase>,
        region: String,
    ) -> Self {
        Self {
            correlator,
            rca_analyzer,
            sop_bridge,
            safety,
            sop_executor,
            knowledge_base,
            region,
            incidents: DashMap::new(),
        }
    }

    /// The knowledge base the RCA analyzer may consult. The orchestrator
    /// never calls it directly (see the system's non-goals); this accessor
    /// exists so callers that build the `System` can wire the same instance
    /// into both places.
    pub fn knowledge_base(&self) -> &Arc<dyn KnowledgeBase> {
        &self.knowledge_base
    }

    /// Runs the six-stage pipeline for one trigger and returns the
    /// finalized `IncidentRecord`. Every exit path, success or otherwise,
    /// goes through `finish`, so `duration_ms` and `stage_timings` are
    /// always consistent even if a stage is skipped.
    pub async fn handle_incident(&self, params: HandleIncidentParams) -> IncidentRecord {
        let incident_id = Uuid::new_v4();
        let created_at = Utc::now();
        let pipeline_start = Instant::now();

        let mut record = IncidentRecord {
            incident_id,
            trigger_type: params.trigger_type,
            trigger_data: params.trigger_data.clone(),
            region: self.region.clone(),
            status: IncidentStatus::Triggered,
            collection_summary: None,
            rca_result: None,
            matched_sops: None,
            safety_check: None,
            execution_result: None,
            created_at,
            completed_at: None,
            duration_ms: 0,
            stage_timings: HashMap::new(),
            error: None,
        };

        info!(%incident_id, trigger = ?params.trigger_type, "incident triggered");

        // Stage 1 - Collect
        record.status = IncidentStatus::Collecting;
        let stage_start = Instant::now();
        let (collection_summary, correlated_event) = self.collect_stage(&params).await;
        record.stage_timings.insert("collect".to_string(), elapsed_ms(stage_start));
        record.collection_summary = Some(collection_summary);

        // Stage 2 - Analyze
        record.status = IncidentStatus::Analyzing;
        let stage_start = Instant::now();
        let rca_result = self.rca_analyzer.analyze(&correlated_event).await;
        record.stage_timings.insert("analyze".to_string(), elapsed_ms(stage_start));
        record.rca_result = Some(rca_result.clone());

        // Stage 3 - SOP Match
        record.status = IncidentStatus::SopMatched;
        let stage_start = Instant::now();
        let matched_sops = self.sop_match_stage(&rca_result).await;
        record.stage_timings.insert("sop_match".to_string(), elapsed_ms(stage_start));
        record.matched_sops = Some(matched_sops.clone());

        if matched_sops.is_empty() {
            info!(%incident_id, "no SOP matched, completing without execution");
            return self.finish(record, pipeline_start, IncidentStatus::Completed, None);
        }

        // Stage 4 - Safety Check
        record.status = IncidentStatus::SafetyCheck;
        let stage_start = Instant::now();
        let top_sop = matched_sops[0].clone();
        let resource_ids = rca_result.resource_ids().to_vec();
        let safety_context = SafetyContext {
            confidence: rca_result.confidence,
            severity: rca_result.severity,
            incident_id,
        };
        let safety_check = self
            .safety
            .check(&top_sop.sop_id, &resource_ids, params.dry_run, params.force, &safety_context)
            .await;
        record.stage_timings.insert("safety_check".to_string(), elapsed_ms(stage_start));
        record.safety_check = Some(safety_check.clone());

        // Stage 5 - Execute / Wait
        record.status = IncidentStatus::Executing;
        let stage_start = Instant::now();
        let (status, execution_result) = self
            .execute_stage(incident_id, &top_sop, &rca_result, &resource_ids, &params, &safety_check)
            .await;
        record.stage_timings.insert("execute".to_string(), elapsed_ms(stage_start));
        record.execution_result = Some(execution_result);

        self.finish(record, pipeline_start, status, None)
    }

    /// Implements the R1-R5 reuse policy exactly: reuse only when the
    /// trigger is non-manual and the supplied `detect_result` is both fresh
    /// and carries a populated `correlated_event`; fall back to fresh
    /// collection in every other case, including when no `detect_result`
    /// was supplied at all. The orchestrator never constructs a
    /// `DetectAgent` itself (R3) — that ownership belongs to
    /// `ProactiveScheduler`.
    async fn collect_stage(
        &self,
        params: &HandleIncidentParams,
    ) -> (CollectionSummary, crate::domain::models::CorrelatedEvent) {
        let now = Utc::now();

        let reusable = params.trigger_type != TriggerType::Manual
            && params.detect_result.as_ref().is_some_and(|dr| {
                !dr.is_stale(now) && dr.correlated_event.is_some()
            });

        if reusable {
            let detect_result = params.detect_result.as_ref().expect("checked above");
            let event = detect_result
                .correlated_event
                .clone()
                .expect("checked above");
            let summary = CollectionSummary {
                collection_id: event.collection_id.clone(),
                metrics: event.metrics.len(),
                alarms: event.alarms.len(),
                trail_events: event.trail_events.len(),
                anomalies: event.anomalies.len(),
                health_events: event.health_events.len(),
                duration_ms: event.duration_ms,
                source: CollectionSource::DetectAgentReuse,
                detect_id: Some(detect_result.detect_id),
                data_age_seconds: Some(detect_result.age_seconds(now)),
            };
            return (summary, event);
        }

        let event = self
            .correlator
            .collect(&self.region, params.services.clone(), params.lookback_minutes, true, true)
            .await;
        let summary = CollectionSummary {
            collection_id: event.collection_id.clone(),
            metrics: event.metrics.len(),
            alarms: event.alarms.len(),
            trail_events: event.trail_events.len(),
            anomalies: event.anomalies.len(),
            health_events: event.health_events.len(),
            duration_ms: event.duration_ms,
            source: CollectionSource::FreshCollection,
            detect_id: None,
            data_age_seconds: None,
        };
        (summary, event)
    }

    /// Stage 3: delegates matching to the external bridge, then annotates
    /// every candidate's `auto_execute` and `risk_level` — the latter for
    /// all matches, not only the one that reaches the safety check.
    async fn sop_match_stage(&self, rca: &RCAResult) -> Vec<MatchedSOP> {
        let auto_execute = rca.severity == crate::domain::models::Severity::Low
            && rca.confidence >= AUTO_EXECUTE_CONFIDENCE_THRESHOLD;

        self.sop_bridge
            .match_sops(rca)
            .await
            .into_iter()
            .map(|mut sop| {
                sop.auto_execute = auto_execute;
                sop.risk_level = Some(classify_risk(&sop.sop_id));
                sop
            })
            .collect()
    }

    /// Stage 5: executes, requests approval, or completes without action,
    /// per §4.4's contract. An executor failure marks `execution_result`
    /// as unsuccessful but never moves the incident to `Failed` — execution
    /// failure does not fail the diagnosis pipeline.
    async fn execute_stage(
        &self,
        incident_id: Uuid,
        top_sop: &MatchedSOP,
        rca: &RCAResult,
        resource_ids: &[String],
        params: &HandleIncidentParams,
        safety_check: &crate::domain::models::SafetyCheck,
    ) -> (IncidentStatus, ExecutionResult) {
        if params.auto_execute && safety_check.passed && !params.dry_run {
            let snapshot = self
                .safety
                .create_snapshot(&top_sop.sop_id, resource_ids, serde_json::json!({}))
                .await;

            let context = ExecutionContext {
                rca_pattern_id: rca.pattern_id.clone(),
                root_cause: rca.root_cause.clone(),
                snapshot_id: Some(snapshot.snapshot_id),
                triggered_by: "incident_orchestrator".to_string(),
            };

            return match self.sop_executor.start(&top_sop.sop_id, context).await {
                Ok(handle) => {
                    self.safety.record_execution(&top_sop.sop_id, resource_ids).await;
                    (
                        IncidentStatus::Completed,
                        ExecutionResult {
                            success: true,
                            sop_id: Some(top_sop.sop_id.clone()),
                            execution_id: Some(handle.execution_id),
                            snapshot_id: Some(snapshot.snapshot_id),
                            approval_id: None,
                            action: Some("executed".to_string()),
                            message: format!("{} started", top_sop.sop_id),
                        },
                    )
                }
                Err(err) => {
                    warn!(%incident_id, sop_id = %top_sop.sop_id, "execution failed: {err}");
                    self.safety.record_failure(&top_sop.sop_id).await;
                    (
                        IncidentStatus::Completed,
                        ExecutionResult {
                            success: false,
                            sop_id: Some(top_sop.sop_id.clone()),
                            execution_id: None,
                            snapshot_id: Some(snapshot.snapshot_id),
                            approval_id: None,
                            action: Some("execution_failed".to_string()),
                            message: err.to_string(),
                        },
                    )
                }
            };
        }

        if safety_check.execution_mode == crate::domain::models::ExecutionMode::Approval {
            let approval = self
                .safety
                .request_approval(
                    &top_sop.sop_id,
                    serde_json::json!({
                        "confidence": rca.confidence,
                        "severity": format!("{:?}", rca.severity),
                        "incident_id": incident_id,
                    }),
                )
                .await;
            return (
                IncidentStatus::WaitingApproval,
                ExecutionResult {
                    success: false,
                    sop_id: Some(top_sop.sop_id.clone()),
                    execution_id: None,
                    snapshot_id: None,
                    approval_id: Some(approval.approval_id),
                    action: Some("approval_requested".to_string()),
                    message: format!("approval requested for {}", top_sop.sop_id),
                },
            );
        }

        (
            IncidentStatus::Completed,
            ExecutionResult {
                success: false,
                sop_id: Some(top_sop.sop_id.clone()),
                execution_id: None,
                snapshot_id: None,
                approval_id: None,
                action: Some("no_action".to_string()),
                message: "no auto-execution; dry-run, notify, or manual review required".to_string(),
            },
        )
    }

    /// Finalizes a record, inserts it into the index, and returns it. The
    /// single path every stage exit funnels through, so `duration_ms`
    /// always reflects the true wall-clock span even when a stage is
    /// skipped or a mid-pipeline branch short-circuits.
    fn finish(
        &self,
        mut record: IncidentRecord,
        pipeline_start: Instant,
        status: IncidentStatus,
        error: Option<String>,
    ) -> IncidentRecord {
        record.status = status;
        record.completed_at = Some(Utc::now());
        record.duration_ms = elapsed_ms(pipeline_start);
        record.error = error;
        self.incidents.insert(record.incident_id, record.clone());
        record
    }

    pub fn get_incident(&self, incident_id: Uuid) -> Option<IncidentRecord> {
        self.incidents.get(&incident_id).map(|entry| entry.value().clone())
    }

    pub fn list(&self, limit: usize, status: Option<IncidentStatus>) -> Vec<IncidentRecord> {
        let mut records: Vec<IncidentRecord> = self
            .incidents
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.value().status == s))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        records
    }

    /// Pure read: does not mutate any counter, so calling it twice without
    /// intervening work is byte-identical.
    pub fn stats(&self) -> OrchestratorStats {
        let records: Vec<IncidentRecord> =
            self.incidents.iter().map(|entry| entry.value().clone()).collect();
        let total = records.len();

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut total_duration = 0u64;
        let mut stage_sums: HashMap<String, u64> = HashMap::new();
        let mut stage_counts: HashMap<String, usize> = HashMap::new();

        for record in &records {
            *by_status.entry(format!("{:?}", record.status)).or_insert(0) += 1;
            total_duration += record.duration_ms;
            for (stage, ms) in &record.stage_timings {
                *stage_sums.entry(stage.clone()).or_insert(0) += ms;
                *stage_counts.entry(stage.clone()).or_insert(0) += 1;
            }
        }

        let avg_duration_ms = if total == 0 { 0.0 } else { total_duration as f64 / total as f64 };
        let avg_stage_timings = stage_sums
            .into_iter()
            .map(|(stage, sum)| {
                let count = stage_counts.get(&stage).copied().unwrap_or(1) as f64;
                (stage, sum as f64 / count)
            })
            .collect();

        OrchestratorStats {
            total,
            by_status,
            avg_duration_ms,
            avg_stage_timings,
            target_ms: TARGET_DURATION_MS,
            within_target: avg_duration_ms <= TARGET_DURATION_MS as f64,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DetectSource, SourceName, SourceStatus};
    use crate::infrastructure::config::settings::SafetyConfig;
    use crate::infrastructure::mock::{MockKnowledgeBase, MockRcaAnalyzer, MockSopBridge, MockSopExecutor};
    use std::collections::HashMap as StdHashMap;

    fn orchestrator() -> IncidentOrchestrator {
        let correlator = Arc::new(EventCorrelator::new(
            StdHashMap::new(),
            crate::services::event_correlator::SoftTimeouts::default(),
        ));
        let safety = Arc::new(SafetyLayer::new(SafetyConfig::default()));
        IncidentOrchestrator::new(
            correlator,
            Arc::new(MockRcaAnalyzer::new()),
            Arc::new(MockSopBridge::new()),
            safety,
            Arc::new(MockSopExecutor::new()),
            Arc::new(MockKnowledgeBase::new()),
            "us-east-1".to_string(),
        )
    }

    #[tokio::test]
    async fn manual_trigger_ignores_supplied_detect_result() {
        let orchestrator = orchestrator();
        let detect_result = Arc::new(DetectResult {
            detect_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: DetectSource::Manual,
            region: "us-east-1".into(),
            ttl_seconds: 300,
            correlated_event: Some(crate::domain::models::CorrelatedEvent {
                collection_id: "abc123456789".into(),
                region: "us-east-1".into(),
                duration_ms: 5,
                source_status: StdHashMap::from([(SourceName::Metrics, SourceStatus::Ok)]),
                source_errors: StdHashMap::new(),
                metrics: vec![],
                alarms: vec![],
                trail_events: vec![],
                health_events: vec![],
                anomalies: vec![],
                recent_changes: vec![],
            }),
            anomalies_detected: vec![],
            error: None,
        });

        let record = orchestrator
            .handle_incident(HandleIncidentParams {
                trigger_type: TriggerType::Manual,
                detect_result: Some(detect_result),
                ..Default::default()
            })
            .await;

        assert_eq!(record.collection_summary.unwrap().source, CollectionSource::FreshCollection);
    }

    #[tokio::test]
    async fn fresh_detect_result_is_reused_for_proactive_trigger() {
        let orchestrator = orchestrator();
        let detect_id = Uuid::new_v4();
        let detect_result = Arc::new(DetectResult {
            detect_id,
            timestamp: Utc::now(),
            source: DetectSource::ProactiveScan,
            region: "us-east-1".into(),
            ttl_seconds: 300,
            correlated_event: Some(crate::domain::models::CorrelatedEvent {
                collection_id: "abc123456789".into(),
                region: "us-east-1".into(),
                duration_ms: 5,
                source_status: StdHashMap::from([(SourceName::Metrics, SourceStatus::Ok)]),
                source_errors: StdHashMap::new(),
                metrics: vec![],
                alarms: vec![],
                trail_events: vec![],
                health_events: vec![],
                anomalies: vec![],
                recent_changes: vec![],
            }),
            anomalies_detected: vec![],
            error: None,
        });

        let record = orchestrator
            .handle_incident(HandleIncidentParams {
                trigger_type: TriggerType::Proactive,
                detect_result: Some(detect_result),
                ..Default::default()
            })
            .await;

        let summary = record.collection_summary.unwrap();
        assert_eq!(summary.source, CollectionSource::DetectAgentReuse);
        assert_eq!(summary.detect_id, Some(detect_id));
        assert!(record.stage_timings["collect"] < 100);
    }

    #[tokio::test]
    async fn stale_detect_result_falls_back_to_fresh_collection() {
        let orchestrator = orchestrator();
        let detect_result = Arc::new(DetectResult {
            detect_id: Uuid::new_v4(),
            timestamp: Utc::now() - chrono::Duration::seconds(301),
            source: DetectSource::ProactiveScan,
            region: "us-east-1".into(),
            ttl_seconds: 300,
            correlated_event: Some(crate::domain::models::CorrelatedEvent {
                collection_id: "abc123456789".into(),
                region: "us-east-1".into(),
                duration_ms: 5,
                source_status: StdHashMap::new(),
                source_errors: StdHashMap::new(),
                metrics: vec![],
                alarms: vec![],
                trail_events: vec![],
                health_events: vec![],
                anomalies: vec![],
                recent_changes: vec![],
            }),
            anomalies_detected: vec![],
            error: None,
        });

        let record = orchestrator
            .handle_incident(HandleIncidentParams {
                trigger_type: TriggerType::Proactive,
                detect_result: Some(detect_result),
                ..Default::default()
            })
            .await;

        assert_eq!(record.collection_summary.unwrap().source, CollectionSource::FreshCollection);
    }

    #[tokio::test]
    async fn no_sop_match_completes_without_safety_check() {
        let orchestrator = orchestrator();
        let record = orchestrator
            .handle_incident(HandleIncidentParams { trigger_type: TriggerType::Manual, ..Default::default() })
            .await;

        assert_eq!(record.status, IncidentStatus::Completed);
        assert!(record.matched_sops.unwrap().is_empty());
        assert!(record.safety_check.is_none());
    }

    #[tokio::test]
    async fn get_incident_returns_recorded_incident() {
        let orchestrator = orchestrator();
        let record = orchestrator
            .handle_incident(HandleIncidentParams { trigger_type: TriggerType::Manual, ..Default::default() })
            .await;

        let fetched = orchestrator.get_incident(record.incident_id).unwrap();
        assert_eq!(fetched.incident_id, record.incident_id);
    }

    #[tokio::test]
    async fn stats_is_pure_read() {
        let orchestrator = orchestrator();
        orchestrator
            .handle_incident(HandleIncidentParams { trigger_type: TriggerType::Manual, ..Default::default() })
            .await;

        let first = orchestrator.stats();
        let second = orchestrator.stats();
        assert_eq!(first.total, second.total);
        assert_eq!(first.avg_duration_ms, second.avg_duration_ms);
    }
}
