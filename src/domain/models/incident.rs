//! `IncidentRecord`: the audit object produced by one `IncidentOrchestrator`
//! pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::rca::RCAResult;
use super::safety::SafetyCheck;
use super::sop::MatchedSOP;

/// What kind of signal started a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Alarm,
    Anomaly,
    HealthEvent,
    Manual,
    Proactive,
}

/// Pipeline stage the incident currently occupies. Transitions are
/// monotonic; once a record reaches a terminal variant it never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Triggered,
    Collecting,
    Analyzing,
    SopMatched,
    SafetyCheck,
    Executing,
    Completed,
    WaitingApproval,
    Failed,
}

impl IncidentStatus {
    /// Terminal statuses are where a record stops and `completed_at` /
    /// `duration_ms` become fixed.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::WaitingApproval | Self::Failed)
    }
}

/// Where the collection stage got its `CorrelatedEvent` from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionSource {
    DetectAgentReuse,
    FreshCollection,
}

/// Summary of Stage 1 (Collect), independent of whether it reused a cached
/// `DetectResult` or ran fresh collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub collection_id: String,
    pub metrics: usize,
    pub alarms: usize,
    pub trail_events: usize,
    pub anomalies: usize,
    pub health_events: usize,
    pub duration_ms: u64,
    pub source: CollectionSource,
    pub detect_id: Option<Uuid>,
    pub data_age_seconds: Option<i64>,
}

/// Outcome of Stage 5 (Execute / Wait).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub sop_id: Option<String>,
    pub execution_id: Option<String>,
    pub snapshot_id: Option<Uuid>,
    pub approval_id: Option<Uuid>,
    pub action: Option<String>,
    pub message: String,
}

/// The audit object of the pipeline: one per `handle_incident` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_id: Uuid,
    pub trigger_type: TriggerType,
    pub trigger_data: serde_json::Value,
    pub region: String,
    pub status: IncidentStatus,
    pub collection_summary: Option<CollectionSummary>,
    pub rca_result: Option<RCAResult>,
    pub matched_sops: Option<Vec<MatchedSOP>>,
    pub safety_check: Option<SafetyCheck>,
    pub execution_result: Option<ExecutionResult>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub stage_timings: HashMap<String, u64>,
    pub error: Option<String>,
}

impl IncidentRecord {
    /// `duration_ms` must be at least the sum of all recorded stage
    /// timings. Used by tests, not enforced at runtime (the finalization
    /// helper derives `duration_ms` from wall-clock, which is always >= the
    /// stage sum barring clock anomalies).
    pub fn duration_covers_stages(&self) -> bool {
        let stage_sum: u64 = self.stage_timings.values().sum();
        self.duration_ms + 50 >= stage_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(IncidentStatus::Completed.is_terminal());
        assert!(IncidentStatus::WaitingApproval.is_terminal());
        assert!(IncidentStatus::Failed.is_terminal());
        assert!(!IncidentStatus::Analyzing.is_terminal());
    }
}
