//! Domain models
//!
//! Pure domain entities for the incident response pipeline. These models
//! are framework-agnostic and contain no infrastructure concerns.

pub mod correlated_event;
pub mod detect_result;
pub mod incident;
pub mod rca;
pub mod safety;
pub mod sop;
pub mod telemetry;

pub use correlated_event::{CorrelatedEvent, RecentChange, SourceName, SourceStatus};
pub use detect_result::{DetectResult, DetectSource, Freshness};
pub use incident::{
    CollectionSource, CollectionSummary, ExecutionResult, IncidentRecord, IncidentStatus,
    TriggerType,
};
pub use rca::{ConfidenceBand, RCAResult, Remediation};
pub use safety::{
    ApprovalStatus, CircuitState, DryRunPreview, ExecutionMode, ExecutionSnapshot,
    PendingApproval, RiskLevel, SafetyCheck,
};
pub use sop::{MatchType, MatchedSOP};
pub use telemetry::{
    AlarmInfo, AlarmState, Anomaly, Comparison, HealthEvent, MetricDataPoint, Severity, Statistic,
    TrailEvent,
};
