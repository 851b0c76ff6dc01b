//! Wires every service and collaborator into one process-lifetime value,
//! replacing the module-level singletons the original source relied on
//! (spec's "process-wide singletons" redesign flag). `System::new` is the
//! single place that owns construction order; everything downstream is
//! handed around as `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::SourceName;
use crate::domain::ports::{CloudDataSource, KnowledgeBase, RcaAnalyzer, SopBridge, SopExecutor};
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::detect_cache::DetectCache;
use crate::services::alarm_ingestor::AlarmIngestor;
use crate::services::detect_agent::DetectAgent;
use crate::services::event_correlator::{EventCorrelator, SoftTimeouts};
use crate::services::incident_orchestrator::IncidentOrchestrator;
use crate::services::proactive_scheduler::ProactiveScheduler;
use crate::services::safety_layer::SafetyLayer;

/// Per-source cloud data collectors, keyed by source.
pub type CloudSources = HashMap<SourceName, Arc<dyn CloudDataSource>>;

/// The external black-box collaborators the pipeline calls out to: RCA
/// analysis, SOP matching/execution, and the knowledge base. Swappable
/// between the in-memory mocks and real adapters without touching any
/// service.
pub struct Collaborators {
    pub rca_analyzer: Arc<dyn RcaAnalyzer>,
    pub sop_bridge: Arc<dyn SopBridge>,
    pub sop_executor: Arc<dyn SopExecutor>,
    pub knowledge_base: Arc<dyn KnowledgeBase>,
}

/// Every live service, constructed once and shared by `Arc`. Holds no
/// business logic itself — it exists purely to fix construction order and
/// give `main.rs` (or a test) one handle to the whole pipeline.
pub struct System {
    pub correlator: Arc<EventCorrelator>,
    pub detect_agent: Arc<DetectAgent>,
    pub scheduler: Arc<ProactiveScheduler>,
    pub orchestrator: Arc<IncidentOrchestrator>,
    pub safety: Arc<SafetyLayer>,
    pub alarm_ingestor: AlarmIngestor,
}

impl System {
    pub fn new(config: Config, sources: CloudSources, collaborators: Collaborators) -> Self {
        let soft_timeouts = SoftTimeouts {
            metrics: std::time::Duration::from_millis(config.collection.soft_timeouts.metrics_ms),
            alarms: std::time::Duration::from_millis(config.collection.soft_timeouts.alarms_ms),
            trail: std::time::Duration::from_millis(config.collection.soft_timeouts.trail_ms),
            anomaly: std::time::Duration::from_millis(config.collection.soft_timeouts.anomaly_ms),
            health: std::time::Duration::from_millis(config.collection.soft_timeouts.health_ms),
        };

        let correlator = Arc::new(
            EventCorrelator::new(sources, soft_timeouts)
                .with_hard_timeout(std::time::Duration::from_millis(config.collection.hard_timeout_ms)),
        );

        let cache = Arc::new(DetectCache::new(std::path::PathBuf::from(config.detect.cache_dir.clone())));

        let detect_agent =
            Arc::new(DetectAgent::new(correlator.clone(), cache, config.region.clone()));

        let safety = Arc::new(SafetyLayer::new(config.safety.clone()));

        let orchestrator = Arc::new(IncidentOrchestrator::new(
            correlator.clone(),
            collaborators.rca_analyzer,
            collaborators.sop_bridge,
            safety.clone(),
            collaborators.sop_executor,
            collaborators.knowledge_base,
            config.region.clone(),
        ));

        let scheduler = Arc::new(ProactiveScheduler::new(
            detect_agent.clone(),
            orchestrator.clone(),
            &config.scheduler,
        ));

        let alarm_ingestor = AlarmIngestor::new(orchestrator.clone());

        Self { correlator, detect_agent, scheduler, orchestrator, safety, alarm_ingestor }
    }
}
