//! `AlarmIngestor`: pure translation from a cloud-provider alarm webhook
//! envelope into an `IncidentOrchestrator` trigger. No HTTP server of its
//! own — `handle` is a plain function a (not-built) web handler would call,
//! the way the teacher keeps protocol parsing separate from transport.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::models::TriggerType;
use crate::services::incident_orchestrator::{HandleIncidentParams, IncidentOrchestrator};

/// Service namespace -> service name table, checked before the substring
/// fallback on the alarm name.
fn namespace_table() -> &'static [(&'static str, &'static str)] {
    &[
        ("AWS/EC2", "ec2"),
        ("AWS/RDS", "rds"),
        ("AWS/Lambda", "lambda"),
        ("AWS/ELB", "elb"),
        ("AWS/ApplicationELB", "elb"),
        ("AWS/DynamoDB", "dynamodb"),
        ("CWAgent", "ec2"),
    ]
}

/// Serializes `IncidentStatus` through its own `snake_case` serde
/// representation rather than `Debug`, so `waiting_approval` keeps its
/// underscore.
fn status_label(status: crate::domain::models::IncidentStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn resolve_service(namespace: &str, alarm_name: &str) -> Option<String> {
    if let Some((_, service)) = namespace_table().iter().find(|(ns, _)| *ns == namespace) {
        return Some((*service).to_string());
    }
    let lower = alarm_name.to_lowercase();
    namespace_table()
        .iter()
        .find(|(_, service)| lower.contains(service))
        .map(|(_, service)| (*service).to_string())
}

#[derive(Debug, Deserialize)]
struct SubscriptionConfirmation {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "SubscribeURL")]
    subscribe_url: String,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AlarmTrigger {
    #[serde(rename = "Namespace")]
    namespace: String,
    #[serde(rename = "MetricName")]
    metric_name: String,
    #[serde(rename = "Threshold")]
    threshold: Option<f64>,
    #[serde(rename = "ComparisonOperator")]
    comparison_operator: Option<String>,
    #[serde(rename = "EvaluationPeriods")]
    evaluation_periods: Option<u32>,
    #[serde(rename = "Period")]
    period: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ParsedAlarm {
    #[serde(rename = "AlarmName")]
    alarm_name: String,
    #[serde(rename = "NewStateValue")]
    new_state: String,
    #[serde(rename = "OldStateValue")]
    old_state: String,
    #[serde(rename = "Region")]
    region: Option<String>,
    #[serde(rename = "Trigger")]
    trigger: Option<AlarmTrigger>,
}

/// Result of `AlarmIngestor::handle`, mirroring the webhook response shapes
/// in §6.1 exactly.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Confirmed,
    Skipped {
        reason: String,
    },
    Processed {
        incident_id: uuid::Uuid,
        pipeline_status: String,
        duration_ms: u64,
        rca_root_cause: String,
        sop_matched: bool,
    },
    Rejected {
        reason: String,
    },
}

/// Translates webhook payloads into orchestrator triggers. Holds only an
/// HTTP client (for subscription confirmation) and a reference to the
/// orchestrator; carries no state of its own.
pub struct AlarmIngestor {
    orchestrator: Arc<IncidentOrchestrator>,
    http: reqwest::Client,
}

impl AlarmIngestor {
    pub fn new(orchestrator: Arc<IncidentOrchestrator>) -> Self {
        Self { orchestrator, http: reqwest::Client::new() }
    }

    pub async fn handle(&self, payload: serde_json::Value) -> IngestOutcome {
        if let Ok(confirmation) = serde_json::from_value::<SubscriptionConfirmation>(payload.clone()) {
            if confirmation.kind == "SubscriptionConfirmation" {
                return self.confirm_subscription(&confirmation.subscribe_url).await;
            }
        }

        let Ok(notification) = serde_json::from_value::<Notification>(payload) else {
            return IngestOutcome::Rejected { reason: "payload matches neither known envelope shape".to_string() };
        };

        let Ok(alarm) = serde_json::from_str::<ParsedAlarm>(&notification.message) else {
            return IngestOutcome::Rejected { reason: "Message field is not a parseable alarm body".to_string() };
        };

        self.process_alarm(alarm).await
    }

    async fn confirm_subscription(&self, subscribe_url: &str) -> IngestOutcome {
        match self.http.get(subscribe_url).send().await {
            Ok(_) => IngestOutcome::Confirmed,
            Err(err) => {
                warn!("subscription confirmation GET failed: {err}");
                IngestOutcome::Rejected { reason: format!("confirmation GET failed: {err}") }
            }
        }
    }

    async fn process_alarm(&self, alarm: ParsedAlarm) -> IngestOutcome {
        if alarm.new_state != "ALARM" || alarm.old_state == "ALARM" {
            let reason = format!("State: {}", alarm.new_state);
            info!(alarm = %alarm.alarm_name, "skipping non-edge alarm transition");
            return IngestOutcome::Skipped { reason };
        }

        let service = alarm
            .trigger
            .as_ref()
            .and_then(|t| resolve_service(&t.namespace, &alarm.alarm_name));

        let trigger_data = serde_json::json!({
            "alarm_name": alarm.alarm_name,
            "new_state": alarm.new_state,
            "old_state": alarm.old_state,
            "region": alarm.region,
            "trigger": alarm.trigger.as_ref().map(|t| serde_json::json!({
                "namespace": t.namespace,
                "metric_name": t.metric_name,
                "threshold": t.threshold,
                "comparison_operator": t.comparison_operator,
                "evaluation_periods": t.evaluation_periods,
                "period": t.period,
            })),
        });

        let record = self
            .orchestrator
            .handle_incident(HandleIncidentParams {
                trigger_type: TriggerType::Alarm,
                trigger_data,
                services: service.map(|s| vec![s]),
                auto_execute: true,
                dry_run: false,
                force: false,
                lookback_minutes: 15,
                detect_result: None,
            })
            .await;

        IngestOutcome::Processed {
            incident_id: record.incident_id,
            pipeline_status: status_label(record.status),
            duration_ms: record.duration_ms,
            rca_root_cause: record.rca_result.map(|r| r.root_cause).unwrap_or_default(),
            sop_matched: record.matched_sops.is_some_and(|sops| !sops.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CloudDataSource;
    use crate::infrastructure::mock::{MockKnowledgeBase, MockRcaAnalyzer, MockSopBridge, MockSopExecutor};
    use crate::services::event_correlator::{EventCorrelator, SoftTimeouts};
    use std::collections::HashMap;

    fn ingestor() -> AlarmIngestor {
        let correlator = Arc::new(EventCorrelator::new(
            HashMap::<crate::domain::models::SourceName, Arc<dyn CloudDataSource>>::new(),
            SoftTimeouts::default(),
        ));
        let safety = Arc::new(crate::services::safety_layer::SafetyLayer::new(
            crate::infrastructure::config::settings::SafetyConfig::default(),
        ));
        let orchestrator = Arc::new(IncidentOrchestrator::new(
            correlator,
            Arc::new(MockRcaAnalyzer::new()),
            Arc::new(MockSopBridge::new()),
            safety,
            Arc::new(MockSopExecutor::new()),
            Arc::new(MockKnowledgeBase::new()),
            "us-east-1".to_string(),
        ));
        AlarmIngestor::new(orchestrator)
    }

    #[tokio::test]
    async fn alarm_state_transition_processes() {
        let ingestor = ingestor();
        let payload = serde_json::json!({
            "Message": serde_json::to_string(&serde_json::json!({
                "AlarmName": "HighCPU",
                "NewStateValue": "ALARM",
                "OldStateValue": "OK",
                "Region": "us-east-1",
                "Trigger": {
                    "Namespace": "AWS/EC2",
                    "MetricName": "CPUUtilization",
                    "Threshold": 90.0,
                }
            })).unwrap()
        });

        match ingestor.handle(payload).await {
            IngestOutcome::Processed { .. } => {}
            other => panic!("expected Processed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ok_transition_is_skipped() {
        let ingestor = ingestor();
        let payload = serde_json::json!({
            "Message": serde_json::to_string(&serde_json::json!({
                "AlarmName": "HighCPU",
                "NewStateValue": "OK",
                "OldStateValue": "ALARM",
                "Region": "us-east-1",
            })).unwrap()
        });

        match ingestor.handle(payload).await {
            IngestOutcome::Skipped { reason } => assert_eq!(reason, "State: OK"),
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn alarm_to_alarm_transition_is_skipped() {
        let ingestor = ingestor();
        let payload = serde_json::json!({
            "Message": serde_json::to_string(&serde_json::json!({
                "AlarmName": "HighCPU",
                "NewStateValue": "ALARM",
                "OldStateValue": "ALARM",
                "Region": "us-east-1",
            })).unwrap()
        });

        match ingestor.handle(payload).await {
            IngestOutcome::Skipped { .. } => {}
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[test]
    fn resolves_known_namespace() {
        assert_eq!(resolve_service("AWS/RDS", "anything").as_deref(), Some("rds"));
    }

    #[test]
    fn falls_back_to_substring_match() {
        assert_eq!(resolve_service("Custom/Namespace", "ec2-instance-down").as_deref(), Some("ec2"));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let ingestor = ingestor();
        match ingestor.handle(serde_json::json!({"unexpected": true})).await {
            IngestOutcome::Rejected { .. } => {}
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
