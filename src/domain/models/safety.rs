//! Data types owned by `SafetyLayer`: risk classification, execution
//! gating, snapshots, and the approval workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk tier assigned to a SOP. See the glossary: L0 read-only, L1
/// low-risk reversible, L2 medium-risk config change, L3 destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    L0,
    L1,
    L2,
    L3,
}

/// What `SafetyLayer::check` decided to allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Auto,
    Notify,
    Approval,
    Blocked,
}

/// Circuit breaker state for a single SOP scope, mirroring the closed/open/
/// half-open machine used elsewhere in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// What execution would do, rendered for a `dry_run` caller without
/// actually running anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunPreview {
    pub resource_ids: Vec<String>,
    pub params: serde_json::Value,
    pub estimated_blast_radius: String,
}

/// Result of `SafetyLayer::check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub sop_id: String,
    pub risk_level: RiskLevel,
    pub execution_mode: ExecutionMode,
    pub passed: bool,
    pub reason: String,
    pub warnings: Vec<String>,
    pub cooldown_remaining_seconds: Option<u64>,
    pub circuit_state: CircuitState,
    pub dry_run_preview: Option<DryRunPreview>,
}

/// A pre-execution snapshot of resource state, created before any non-L0
/// execution so a future rollback has something to restore to. Ephemeral:
/// held in memory only and lost on restart, matching the declared restart
/// semantics for this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub snapshot_id: Uuid,
    pub sop_id: String,
    pub resource_ids: Vec<String>,
    pub pre_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Disposition of a `PendingApproval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// An out-of-band human decision gating an L2/L3 execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: Uuid,
    pub sop_id: String,
    pub requested_at: DateTime<Utc>,
    pub context: serde_json::Value,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl PendingApproval {
    /// Approval expiry is checked lazily at read time against the
    /// configured TTL rather than swept by a background task.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
        self.status == ApprovalStatus::Pending
            && (now - self.requested_at).num_seconds() > ttl_seconds as i64
    }
}
