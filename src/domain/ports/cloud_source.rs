//! Port for the five cloud telemetry sources `EventCorrelator` fans out to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::{
    AlarmInfo, Anomaly, CorrelatedEvent, HealthEvent, MetricDataPoint, SourceName, TrailEvent,
};

/// Parameters shared by every source in one collection cycle.
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub region: String,
    pub services: Option<Vec<String>>,
    pub lookback_minutes: u32,
    pub now: DateTime<Utc>,
}

/// One source's payload, tagged by which source produced it. A single
/// object-safe trait covers all five sources so `EventCorrelator` can hold
/// them uniformly in a `HashMap<SourceName, Arc<dyn CloudDataSource>>`.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    Metrics(Vec<MetricDataPoint>),
    Alarms(Vec<AlarmInfo>),
    Trail(Vec<TrailEvent>),
    Anomaly(Vec<Anomaly>),
    Health(Vec<HealthEvent>),
}

/// Error returned by a single source fetch. Never seen outside
/// `EventCorrelator::collect`, which folds it into `source_status`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SourceFetchError(pub String);

/// A single cloud telemetry source (metrics, alarms, audit trail, anomaly
/// feed, or health feed).
#[async_trait]
pub trait CloudDataSource: Send + Sync {
    /// Which source this implementation represents, used to key the
    /// correlator's per-source timeout table and `source_status` map.
    fn name(&self) -> SourceName;

    /// Fetch this source's telemetry for the given context. Implementations
    /// should not apply their own timeout — `EventCorrelator` wraps every
    /// call in `tokio::time::timeout` using the per-source soft budget.
    async fn fetch(&self, ctx: &CollectionContext) -> Result<SourcePayload, SourceFetchError>;
}

/// Black-box root-cause analyzer. Must never fail: on internal error it
/// returns a low-confidence "unknown" result rather than propagating an
/// error, per the external interface contract.
#[async_trait]
pub trait RcaAnalyzer: Send + Sync {
    async fn analyze(&self, event: &CorrelatedEvent) -> crate::domain::models::RCAResult;
}

/// Black-box SOP matcher: `RCAResult` in, ordered candidate SOPs out.
#[async_trait]
pub trait SopBridge: Send + Sync {
    async fn match_sops(
        &self,
        rca: &crate::domain::models::RCAResult,
    ) -> Vec<crate::domain::models::MatchedSOP>;
}

/// Handle returned by `SopExecutor::start`; execution proceeds out-of-band.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: String,
}

/// Opaque context passed to the SOP executor when starting a remediation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionContext {
    pub rca_pattern_id: String,
    pub root_cause: String,
    pub snapshot_id: Option<uuid::Uuid>,
    pub triggered_by: String,
}

/// Black-box SOP executor. The only surface in the system that is allowed
/// to mutate external resources, and it does so entirely out-of-band: this
/// trait's contract ends at `start` returning a handle.
#[async_trait]
pub trait SopExecutor: Send + Sync {
    async fn start(
        &self,
        sop_id: &str,
        context: ExecutionContext,
    ) -> Result<ExecutionHandle, SourceFetchError>;
}

/// Search strategy requested of the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Fast,
    Semantic,
    Deep,
    Auto,
}

/// One hit returned by `KnowledgeBase::search`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KnowledgeHit {
    pub pattern_id: String,
    pub summary: String,
    pub score: f64,
}

/// Result of a knowledge-base search, including which strategy levels were
/// actually tried (an `auto` search may escalate through fast -> semantic ->
/// deep before returning).
#[derive(Debug, Clone)]
pub struct KnowledgeSearchResult {
    pub hits: Vec<KnowledgeHit>,
    pub levels_tried: Vec<SearchStrategy>,
    pub duration_ms: u64,
}

/// Black-box vector/keyword knowledge base consulted by the RCA analyzer to
/// enrich its prompt with historical patterns. The orchestrator never calls
/// this directly.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(
        &self,
        query: &str,
        strategy: SearchStrategy,
    ) -> KnowledgeSearchResult;

    /// Indexes a new pattern; rejects (`false`) if `quality_score < 0.70`.
    async fn index(&self, pattern: &str, quality_score: f64) -> bool;
}
