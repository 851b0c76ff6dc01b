//! The atomic output of one `EventCorrelator` collection cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::telemetry::{AlarmInfo, Anomaly, HealthEvent, MetricDataPoint, TrailEvent};

/// Which cloud data source a collection cycle fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Metrics,
    Alarms,
    Trail,
    Anomaly,
    Health,
}

/// Outcome of one source within a collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Error,
    Timeout,
}

/// A non-read-only trail event, projected for RCA consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentChange {
    pub event_name: String,
    pub user_identity: String,
    pub resource_id: String,
    pub event_time: DateTime<Utc>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// The merged result of fanning out to every requested cloud data source.
///
/// Constructed once by `EventCorrelator::collect` and never mutated after
/// return; eligible for garbage collection once no `DetectAgent` or
/// `IncidentRecord` references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedEvent {
    pub collection_id: String,
    pub region: String,
    pub duration_ms: u64,
    pub source_status: HashMap<SourceName, SourceStatus>,
    pub source_errors: HashMap<SourceName, String>,
    pub metrics: Vec<MetricDataPoint>,
    pub alarms: Vec<AlarmInfo>,
    pub trail_events: Vec<TrailEvent>,
    pub health_events: Vec<HealthEvent>,
    pub anomalies: Vec<Anomaly>,
    pub recent_changes: Vec<RecentChange>,
}

impl CorrelatedEvent {
    /// True once every requested source reported something other than `Ok`.
    pub fn all_sources_failed(&self) -> bool {
        !self.source_status.is_empty()
            && self
                .source_status
                .values()
                .all(|s| !matches!(s, SourceStatus::Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: SourceStatus) -> CorrelatedEvent {
        let mut source_status = HashMap::new();
        source_status.insert(SourceName::Metrics, status);
        CorrelatedEvent {
            collection_id: "abc123456789".into(),
            region: "us-east-1".into(),
            duration_ms: 12,
            source_status,
            source_errors: HashMap::new(),
            metrics: vec![],
            alarms: vec![],
            trail_events: vec![],
            health_events: vec![],
            anomalies: vec![],
            recent_changes: vec![],
        }
    }

    #[test]
    fn all_sources_failed_true_when_every_source_errored() {
        assert!(sample(SourceStatus::Error).all_sources_failed());
        assert!(sample(SourceStatus::Timeout).all_sources_failed());
    }

    #[test]
    fn all_sources_failed_false_when_any_source_ok() {
        assert!(!sample(SourceStatus::Ok).all_sources_failed());
    }
}
