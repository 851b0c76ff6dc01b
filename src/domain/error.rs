//! Domain error types for the incident response pipeline.
//!
//! Each error enum covers one pipeline stage. Variants are classified as
//! transient or permanent so callers can decide whether to retry, fall back
//! to a cached result, or surface the failure immediately.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while `EventCorrelator` collects and merges telemetry.
#[derive(Error, Debug, Clone)]
pub enum CollectionError {
    /// A data source timed out within its soft per-source budget.
    #[error("source '{0}' timed out after {1}ms")]
    SourceTimeout(String, u64),

    /// A data source returned an error after exhausting its retry budget.
    #[error("source '{0}' failed: {1}")]
    SourceFailed(String, String),

    /// The overall 30s collection budget elapsed before all sources returned.
    #[error("collection exceeded hard budget of {0}ms")]
    BudgetExceeded(u64),

    /// All configured sources failed; there is nothing to correlate.
    #[error("all sources failed for resource '{0}'")]
    AllSourcesFailed(String),
}

impl CollectionError {
    /// Individual source failures are always transient from the caller's
    /// perspective: `CorrelatedEvent` degrades gracefully via `SourceStatus`
    /// rather than failing the whole collection.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SourceTimeout(..) | Self::SourceFailed(..))
    }

    /// True once collection cannot produce a usable `CorrelatedEvent` at all.
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Errors raised by `DetectAgent` while producing or reading a `DetectResult`.
#[derive(Error, Debug, Clone)]
pub enum DetectError {
    /// The underlying collection failed.
    #[error("collection failed: {0}")]
    Collection(#[from] CollectionError),

    /// The on-disk cache could not be read or written.
    #[error("cache I/O error: {0}")]
    CacheIo(String),

    /// The cache file contained a result that failed to deserialize.
    #[error("cache contained a corrupt result: {0}")]
    CacheCorrupt(String),

    /// No `DetectResult` exists yet for the requested resource.
    #[error("no detect result available for resource '{0}'")]
    NoResultAvailable(String),
}

impl DetectError {
    /// Cache errors and no-result-yet are recoverable: the caller can fall
    /// back to running a fresh detection.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CacheIo(_) | Self::NoResultAvailable(_))
    }
}

/// Errors raised while `IncidentOrchestrator` drives an incident through its
/// pipeline stages.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// The referenced incident does not exist.
    #[error("incident not found: {0}")]
    NotFound(Uuid),

    /// Stage collection failed and no stale fallback was available.
    #[error("collection stage failed: {0}")]
    CollectionFailed(#[from] CollectionError),

    /// RCA analysis failed or returned an unusable result.
    #[error("analysis stage failed: {0}")]
    AnalysisFailed(String),

    /// The SOP bridge could not match a standard operating procedure.
    #[error("no matching SOP found for incident {0}")]
    NoSopMatch(Uuid),

    /// The safety layer blocked execution outright.
    #[error("safety layer blocked execution: {0}")]
    SafetyBlocked(String),

    /// A state transition was attempted that violates the monotonic pipeline
    /// ordering (e.g. COMPLETED -> ANALYZING).
    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The SOP executor reported a remediation failure.
    #[error("execution stage failed: {0}")]
    ExecutionFailed(String),
}

impl OrchestratorError {
    /// Returns true when retrying `handle_incident` with a fresh
    /// `detect_result` might succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CollectionFailed(_) | Self::AnalysisFailed(_))
    }
}

/// Errors raised by `SafetyLayer` while checking or recording executions.
#[derive(Error, Debug, Clone)]
pub enum SafetyError {
    /// The circuit for this scope is open; execution must not proceed.
    #[error("circuit open for '{0}', retry after {1}s")]
    CircuitOpen(String, u64),

    /// A cooldown window is still active for this resource.
    #[error("cooldown active for '{0}', {1}s remaining")]
    CooldownActive(String, u64),

    /// The risk classification could not be determined from the inputs.
    #[error("unable to classify risk for remediation '{0}'")]
    UnclassifiableRisk(String),

    /// An approval was requested for an incident that has no pending entry.
    #[error("no pending approval for incident {0}")]
    NoPendingApproval(Uuid),

    /// The approval had already been resolved (approved or rejected).
    #[error("approval for incident {0} was already resolved")]
    ApprovalAlreadyResolved(Uuid),
}

impl SafetyError {
    /// All safety blocks are by design permanent for the current attempt;
    /// the caller must wait out the cooldown/circuit rather than retry
    /// immediately.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::CircuitOpen(..) | Self::CooldownActive(..))
    }
}

/// Errors raised while ingesting an inbound alarm webhook.
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    /// The webhook body could not be parsed as a known envelope shape.
    #[error("malformed webhook envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope's signing certificate or signature failed verification.
    #[error("signature verification failed")]
    BadSignature,

    /// The subscription confirmation GET failed.
    #[error("subscription confirmation failed: {0}")]
    SubscriptionConfirmFailed(String),

    /// No namespace-to-service mapping exists for the alarm's metric
    /// namespace, so the alarm cannot be routed.
    #[error("no service mapping for namespace '{0}'")]
    UnmappedNamespace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_error_timeout_is_transient() {
        let err = CollectionError::SourceTimeout("metrics".into(), 2500);
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn collection_error_all_failed_is_permanent() {
        let err = CollectionError::AllSourcesFailed("web-01".into());
        assert!(err.is_permanent());
    }

    #[test]
    fn detect_error_display() {
        let err = DetectError::NoResultAvailable("web-01".into());
        assert_eq!(
            err.to_string(),
            "no detect result available for resource 'web-01'"
        );
    }

    #[test]
    fn orchestrator_error_from_collection_error() {
        let err: OrchestratorError = CollectionError::BudgetExceeded(30_000).into();
        assert!(matches!(err, OrchestratorError::CollectionFailed(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn safety_error_cooldown_is_permanent_for_now() {
        let err = SafetyError::CooldownActive("web-01".into(), 120);
        assert!(err.is_permanent());
    }

    #[test]
    fn ingest_error_display() {
        let err = IngestError::UnmappedNamespace("AWS/Custom".into());
        assert_eq!(err.to_string(), "no service mapping for namespace 'AWS/Custom'");
    }
}
