//! Application services for the incident response pipeline.

pub mod alarm_ingestor;
pub mod detect_agent;
pub mod event_correlator;
pub mod incident_orchestrator;
pub mod proactive_scheduler;
pub mod safety_layer;

pub use alarm_ingestor::{AlarmIngestor, IngestOutcome};
pub use detect_agent::{AgentStatus, DetectAgent, DetectHealth};
pub use event_correlator::{AnomalyThreshold, EventCorrelator, SoftTimeouts};
pub use incident_orchestrator::{HandleIncidentParams, IncidentOrchestrator, OrchestratorStats};
pub use proactive_scheduler::{
    ProactiveResult, ProactiveScheduler, ScheduledTask, SchedulerStatus, TaskAction, TaskSchedule,
};
pub use safety_layer::{classify_risk, SafetyContext, SafetyLayer, SafetyStats};
