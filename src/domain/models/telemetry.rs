//! Raw telemetry types collected from cloud data sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation function applied to a metric over its evaluation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Average,
    Maximum,
    Minimum,
    Sum,
}

/// One measured value for a resource's metric. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub resource_id: String,
    pub metric_name: String,
    pub namespace: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub statistic: Statistic,
}

/// Alarm evaluation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

/// Comparison operator used by an alarm's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
}

/// An alarm at evaluation time. Alarms whose state is `Alarm` contribute to
/// the derived anomaly set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmInfo {
    pub name: String,
    pub state: AlarmState,
    pub reason: String,
    pub metric_name: String,
    pub threshold: f64,
    pub comparison: Comparison,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A control-plane audit record. Non-read-only events form the
/// "recent changes" projection used by RCA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailEvent {
    pub event_time: DateTime<Utc>,
    pub event_name: String,
    pub user_identity: String,
    pub resource_id: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub read_only: bool,
}

/// A provider-announced service event (e.g. a regional outage notice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub service: String,
    pub event_type: String,
    pub status: String,
    pub affected_resources: Vec<String>,
    pub description: String,
    pub start_time: DateTime<Utc>,
}

/// Severity bucket for a derived anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A finding derived by comparing a metric statistic against its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub resource: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub description: String,
}

impl Anomaly {
    /// Classifies severity per the collector's fixed formula: `high` once the
    /// value reaches 110% of threshold, `medium` above the raw threshold,
    /// `low` otherwise.
    pub fn classify_severity(value: f64, threshold: f64) -> Severity {
        if value >= threshold * 1.1 {
            Severity::High
        } else if value >= threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_high_at_110_percent_of_threshold() {
        assert_eq!(Anomaly::classify_severity(88.0, 80.0), Severity::High);
        assert_eq!(Anomaly::classify_severity(87.9, 80.0), Severity::Medium);
    }

    #[test]
    fn severity_medium_at_threshold() {
        assert_eq!(Anomaly::classify_severity(80.0, 80.0), Severity::Medium);
    }

    #[test]
    fn severity_low_below_threshold() {
        assert_eq!(Anomaly::classify_severity(40.0, 80.0), Severity::Low);
    }
}
