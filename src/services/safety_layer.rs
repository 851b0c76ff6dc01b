//! Risk classification, cooldown, and circuit-breaker gate for automated
//! remediation. Modeled directly on `circuit_breaker.rs`'s
//! `CircuitBreakerService`: a config struct, an `Arc<RwLock<HashMap<..>>>`
//! of per-scope state, and async `check`/`record_failure`/`record_success`
//! entry points, generalized here to key off SOP id instead of an agent or
//! task-chain scope.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::SafetyError;
use crate::domain::models::{
    ApprovalStatus, CircuitState, DryRunPreview, ExecutionSnapshot, PendingApproval, RiskLevel,
    SafetyCheck,
};
use crate::infrastructure::config::settings::SafetyConfig;

/// Context the orchestrator supplies alongside a SOP id at check time.
#[derive(Debug, Clone)]
pub struct SafetyContext {
    pub confidence: f64,
    pub severity: crate::domain::models::Severity,
    pub incident_id: Uuid,
}

/// Per-SOP circuit state, mirroring `circuit_breaker.rs`'s `CircuitBreaker`
/// bookkeeping (`failures`, `opened_at`, half-open trial counter).
#[derive(Debug, Clone)]
struct SopCircuit {
    state: CircuitState,
    failure_timestamps: Vec<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

impl SopCircuit {
    fn new() -> Self {
        Self { state: CircuitState::Closed, failure_timestamps: Vec::new(), opened_at: None }
    }

    fn prune(&mut self, now: DateTime<Utc>, window_seconds: u64) {
        let cutoff = now - chrono::Duration::seconds(window_seconds as i64);
        self.failure_timestamps.retain(|t| *t >= cutoff);
    }

    /// Resolves open -> half-open at read time, the same lazy-check idiom
    /// the teacher's `CircuitBreaker::allows` uses instead of a background
    /// sweeper.
    fn resolve(&mut self, now: DateTime<Utc>, open_seconds: u64) {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if (now - opened_at).num_seconds() >= open_seconds as i64 {
                    self.state = CircuitState::HalfOpen;
                }
            }
        }
    }
}

/// Daily-reset counters, reused across modes/risk levels.
#[derive(Debug, Clone, Default)]
struct DailyCounters {
    total_checks: u64,
    by_mode: HashMap<String, u64>,
    by_risk: HashMap<String, u64>,
}

/// Aggregated counters returned by `stats`.
#[derive(Debug, Clone)]
pub struct SafetyStats {
    pub total_checks: u64,
    pub by_mode: HashMap<String, u64>,
    pub by_risk: HashMap<String, u64>,
    pub circuit_breakers_open: u64,
    pub pending_approvals: u64,
}

/// Default risk level when no table entry or verb heuristic matches,
/// per §4.5: "safe default, require operator attention".
const DEFAULT_RISK_LEVEL: RiskLevel = RiskLevel::L2;

/// Table-driven with verb-based fallback, default `L2` ("safe default,
/// require operator attention"). Exposed as a free function so
/// `IncidentOrchestrator` can annotate every matched SOP's `risk_level` in
/// Stage 3, not only the top SOP that actually reaches `check`.
pub fn classify_risk(sop_id: &str) -> RiskLevel {
    let known: &[(&str, RiskLevel)] = &[
        ("describe_", RiskLevel::L0),
        ("list_", RiskLevel::L0),
        ("get_", RiskLevel::L0),
        ("restart_", RiskLevel::L1),
        ("scale_", RiskLevel::L1),
        ("failover_", RiskLevel::L2),
        ("modify_", RiskLevel::L2),
        ("terminate_", RiskLevel::L3),
        ("delete_", RiskLevel::L3),
    ];

    let stripped = sop_id.strip_prefix("sop-").unwrap_or(sop_id);
    for (prefix, level) in known {
        if stripped.starts_with(prefix) || sop_id.starts_with(prefix) {
            return *level;
        }
    }

    // Verb-based fallback: scan for a known action verb anywhere in the id.
    let verb_fallback: &[(&str, RiskLevel)] = &[
        ("describe", RiskLevel::L0),
        ("restart", RiskLevel::L1),
        ("scale", RiskLevel::L1),
        ("failover", RiskLevel::L2),
        ("modify", RiskLevel::L2),
        ("terminate", RiskLevel::L3),
        ("delete", RiskLevel::L3),
    ];
    for (verb, level) in verb_fallback {
        if sop_id.contains(verb) {
            return *level;
        }
    }

    DEFAULT_RISK_LEVEL
}

/// Gates remediation attempts: risk classification, cooldown ledger, and
/// per-SOP circuit breaker, plus snapshot and approval bookkeeping.
///
/// Snapshots and pending approvals are held in memory only and do not
/// survive a restart, matching the documented ephemeral-state semantics
/// for this subsystem (no persistence was requested beyond the detect
/// cache).
pub struct SafetyLayer {
    config: SafetyConfig,
    circuits: RwLock<HashMap<String, SopCircuit>>,
    /// `(sop_id, resource_id)` -> last execution time; `resource_id = None`
    /// keys the SOP-global cooldown.
    cooldowns: RwLock<HashMap<(String, Option<String>), DateTime<Utc>>>,
    snapshots: RwLock<HashMap<Uuid, ExecutionSnapshot>>,
    approvals: RwLock<HashMap<Uuid, PendingApproval>>,
    counters: RwLock<DailyCounters>,
    last_reset_date: RwLock<NaiveDate>,
}

impl SafetyLayer {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            approvals: RwLock::new(HashMap::new()),
            counters: RwLock::new(DailyCounters::default()),
            last_reset_date: RwLock::new(Local::now().date_naive()),
        }
    }

    /// Resets the per-day counters exactly once per local calendar day,
    /// mirroring the teacher's cheap-check-then-mutate idiom in
    /// `event_scheduler.rs`'s `fire_state_dirty` handling.
    async fn maybe_reset_daily(&self) {
        let today = Local::now().date_naive();
        let mut last = self.last_reset_date.write().await;
        if *last != today {
            *last = today;
            *self.counters.write().await = DailyCounters::default();
        }
    }

    fn cooldown_window_seconds(&self, risk: RiskLevel) -> u64 {
        match risk {
            RiskLevel::L0 => 0,
            RiskLevel::L1 => self.config.cooldown.l1_seconds,
            RiskLevel::L2 => self.config.cooldown.l2_seconds,
            RiskLevel::L3 => self.config.cooldown.l3_seconds,
        }
    }

    /// Longest remaining cooldown across the global and per-resource keys,
    /// per §4.5 "the longer remaining interval wins".
    async fn cooldown_remaining(&self, sop_id: &str, resource_ids: &[String], risk: RiskLevel) -> u64 {
        let window = self.cooldown_window_seconds(risk);
        if window == 0 {
            return 0;
        }
        let now = Utc::now();
        let ledger = self.cooldowns.read().await;

        let mut remaining = 0u64;
        if let Some(last) = ledger.get(&(sop_id.to_string(), None)) {
            remaining = remaining.max(remaining_seconds(*last, now, window));
        }
        for resource_id in resource_ids {
            if let Some(last) = ledger.get(&(sop_id.to_string(), Some(resource_id.clone()))) {
                remaining = remaining.max(remaining_seconds(*last, now, window));
            }
        }
        remaining
    }

    fn execution_mode(risk: RiskLevel, confidence: f64, severity: crate::domain::models::Severity) -> crate::domain::models::ExecutionMode {
        use crate::domain::models::{ExecutionMode, Severity};
        match risk {
            RiskLevel::L0 => ExecutionMode::Auto,
            RiskLevel::L1 => {
                if confidence >= 0.8 && severity != Severity::High {
                    ExecutionMode::Auto
                } else {
                    ExecutionMode::Notify
                }
            }
            RiskLevel::L2 | RiskLevel::L3 => ExecutionMode::Approval,
        }
    }

    /// Implements the exact algorithm in §4.5: risk -> circuit -> cooldown
    /// -> execution-mode-by-risk-and-context -> dry-run override.
    pub async fn check(
        &self,
        sop_id: &str,
        resource_ids: &[String],
        dry_run: bool,
        force: bool,
        context: &SafetyContext,
    ) -> SafetyCheck {
        self.maybe_reset_daily().await;
        let risk = classify_risk(sop_id);
        let now = Utc::now();

        let circuit_state = {
            let mut circuits = self.circuits.write().await;
            let circuit = circuits.entry(sop_id.to_string()).or_insert_with(SopCircuit::new);
            circuit.prune(now, self.config.circuit_breaker.window_seconds);
            circuit.resolve(now, self.config.circuit_breaker.open_seconds);
            circuit.state
        };

        {
            let mut counters = self.counters.write().await;
            counters.total_checks += 1;
            *counters.by_risk.entry(format!("{risk:?}")).or_insert(0) += 1;
        }

        if circuit_state == CircuitState::Open && !force {
            return self
                .record_mode(crate::domain::models::ExecutionMode::Blocked, SafetyCheck {
                    sop_id: sop_id.to_string(),
                    risk_level: risk,
                    execution_mode: crate::domain::models::ExecutionMode::Blocked,
                    passed: false,
                    reason: "circuit breaker open".to_string(),
                    warnings: vec![],
                    cooldown_remaining_seconds: None,
                    circuit_state,
                    dry_run_preview: None,
                })
                .await;
        }

        if !force {
            let remaining = self.cooldown_remaining(sop_id, resource_ids, risk).await;
            if remaining > 0 {
                return self
                    .record_mode(crate::domain::models::ExecutionMode::Blocked, SafetyCheck {
                        sop_id: sop_id.to_string(),
                        risk_level: risk,
                        execution_mode: crate::domain::models::ExecutionMode::Blocked,
                        passed: false,
                        reason: format!("cooldown active, {remaining}s remaining"),
                        warnings: vec![],
                        cooldown_remaining_seconds: Some(remaining),
                        circuit_state,
                        dry_run_preview: None,
                    })
                    .await;
            }
        }

        let mode = Self::execution_mode(risk, context.confidence, context.severity);
        let mut warnings = Vec::new();
        if risk == RiskLevel::L3 {
            warnings.push("L3 destructive action requires explicit approval".to_string());
        }

        let mut passed = matches!(mode, crate::domain::models::ExecutionMode::Auto);
        let mut dry_run_preview = None;

        if dry_run {
            passed = true;
            dry_run_preview = Some(DryRunPreview {
                resource_ids: resource_ids.to_vec(),
                params: serde_json::json!({ "sop_id": sop_id }),
                estimated_blast_radius: format!("{} resource(s)", resource_ids.len()),
            });
        }

        self.record_mode(
            mode,
            SafetyCheck {
                sop_id: sop_id.to_string(),
                risk_level: risk,
                execution_mode: mode,
                passed,
                reason: format!("{risk:?} risk classified as {mode:?}"),
                warnings,
                cooldown_remaining_seconds: None,
                circuit_state,
                dry_run_preview,
            },
        )
        .await
    }

    async fn record_mode(&self, mode: crate::domain::models::ExecutionMode, check: SafetyCheck) -> SafetyCheck {
        let mut counters = self.counters.write().await;
        *counters.by_mode.entry(format!("{mode:?}")).or_insert(0) += 1;
        check
    }

    pub async fn create_snapshot(
        &self,
        sop_id: &str,
        resource_ids: &[String],
        pre_state: serde_json::Value,
    ) -> ExecutionSnapshot {
        let snapshot = ExecutionSnapshot {
            snapshot_id: Uuid::new_v4(),
            sop_id: sop_id.to_string(),
            resource_ids: resource_ids.to_vec(),
            pre_state,
            created_at: Utc::now(),
        };
        self.snapshots.write().await.insert(snapshot.snapshot_id, snapshot.clone());
        snapshot
    }

    pub async fn get_snapshot(&self, snapshot_id: Uuid) -> Option<ExecutionSnapshot> {
        self.snapshots.read().await.get(&snapshot_id).cloned()
    }

    /// Records a successful execution: updates the cooldown ledger and
    /// closes the circuit if it was half-open, under the same lock the
    /// circuit state lives under so the `(opened_at, failures)` pair is
    /// never read torn, per the concurrency model's shared-resource policy.
    pub async fn record_execution(&self, sop_id: &str, resource_ids: &[String]) {
        let now = Utc::now();
        {
            let mut ledger = self.cooldowns.write().await;
            ledger.insert((sop_id.to_string(), None), now);
            for resource_id in resource_ids {
                ledger.insert((sop_id.to_string(), Some(resource_id.clone())), now);
            }
        }
        self.record_success(sop_id).await;
    }

    /// Closes the circuit on a successful run, matching the teacher's
    /// close-on-next-success transition out of half-open.
    pub async fn record_success(&self, sop_id: &str) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(sop_id.to_string()).or_insert_with(SopCircuit::new);
        circuit.state = CircuitState::Closed;
        circuit.failure_timestamps.clear();
        circuit.opened_at = None;
    }

    /// Records an execution failure, opening the circuit once the
    /// configured threshold is reached within the sliding window.
    pub async fn record_failure(&self, sop_id: &str) {
        let now = Utc::now();
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(sop_id.to_string()).or_insert_with(SopCircuit::new);
        circuit.prune(now, self.config.circuit_breaker.window_seconds);
        circuit.failure_timestamps.push(now);

        if circuit.failure_timestamps.len() as u32 >= self.config.circuit_breaker.failure_threshold {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(now);
        }
    }

    pub async fn request_approval(&self, sop_id: &str, context: serde_json::Value) -> PendingApproval {
        let approval = PendingApproval {
            approval_id: Uuid::new_v4(),
            sop_id: sop_id.to_string(),
            requested_at: Utc::now(),
            context,
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
        };
        self.approvals.write().await.insert(approval.approval_id, approval.clone());
        approval
    }

    pub async fn approve(&self, approval_id: Uuid, actor: &str) -> Result<PendingApproval, SafetyError> {
        self.resolve_approval(approval_id, actor, ApprovalStatus::Approved).await
    }

    pub async fn reject(&self, approval_id: Uuid, actor: &str, _reason: &str) -> Result<PendingApproval, SafetyError> {
        self.resolve_approval(approval_id, actor, ApprovalStatus::Rejected).await
    }

    async fn resolve_approval(
        &self,
        approval_id: Uuid,
        actor: &str,
        status: ApprovalStatus,
    ) -> Result<PendingApproval, SafetyError> {
        let mut approvals = self.approvals.write().await;
        let approval = approvals
            .get_mut(&approval_id)
            .ok_or_else(|| SafetyError::NoPendingApproval(approval_id))?;

        if approval.status != ApprovalStatus::Pending {
            return Err(SafetyError::ApprovalAlreadyResolved(approval_id));
        }

        approval.status = status;
        approval.decided_by = Some(actor.to_string());
        approval.decided_at = Some(Utc::now());
        Ok(approval.clone())
    }

    /// Pending approvals, with expiry resolved lazily against the
    /// configured TTL rather than swept by a background task.
    pub async fn get_pending_approvals(&self) -> Vec<PendingApproval> {
        let now = Utc::now();
        let mut approvals = self.approvals.write().await;
        for approval in approvals.values_mut() {
            if approval.is_expired(now, self.config.approval_ttl_seconds) {
                approval.status = ApprovalStatus::Expired;
            }
        }
        approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> SafetyStats {
        self.maybe_reset_daily().await;
        let counters = self.counters.read().await;
        let circuits = self.circuits.read().await;
        let open = circuits.values().filter(|c| c.state == CircuitState::Open).count() as u64;
        let pending = self.approvals.read().await.values().filter(|a| a.status == ApprovalStatus::Pending).count() as u64;

        SafetyStats {
            total_checks: counters.total_checks,
            by_mode: counters.by_mode.clone(),
            by_risk: counters.by_risk.clone(),
            circuit_breakers_open: open,
            pending_approvals: pending,
        }
    }
}

fn remaining_seconds(last: DateTime<Utc>, now: DateTime<Utc>, window_seconds: u64) -> u64 {
    let elapsed = (now - last).num_seconds().max(0) as u64;
    window_seconds.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;

    fn context() -> SafetyContext {
        SafetyContext { confidence: 0.9, severity: Severity::Low, incident_id: Uuid::new_v4() }
    }

    #[test]
    fn classify_risk_known_prefixes() {
        assert_eq!(classify_risk("sop-describe-instances"), RiskLevel::L0);
        assert_eq!(classify_risk("sop-restart-service"), RiskLevel::L1);
        assert_eq!(classify_risk("sop-scale-capacity"), RiskLevel::L1);
        assert_eq!(classify_risk("sop-failover-traffic"), RiskLevel::L2);
        assert_eq!(classify_risk("sop-terminate-instance"), RiskLevel::L3);
    }

    #[test]
    fn classify_risk_unknown_defaults_to_l2() {
        assert_eq!(classify_risk("sop-mystery-action"), RiskLevel::L2);
    }

    #[tokio::test]
    async fn l0_is_auto_with_no_cooldown() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        let check = layer.check("sop-describe-instances", &["i-1".into()], false, false, &context()).await;
        assert_eq!(check.execution_mode, crate::domain::models::ExecutionMode::Auto);
        assert!(check.passed);
    }

    #[tokio::test]
    async fn l3_requires_approval_and_fails_without_force() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        let check = layer.check("sop-terminate-instance", &["i-1".into()], false, false, &context()).await;
        assert_eq!(check.execution_mode, crate::domain::models::ExecutionMode::Approval);
        assert!(!check.passed);
    }

    #[tokio::test]
    async fn dry_run_forces_pass_and_populates_preview() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        let check = layer.check("sop-terminate-instance", &["i-1".into()], true, false, &context()).await;
        assert!(check.passed);
        assert!(check.dry_run_preview.is_some());
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_failures() {
        let mut config = SafetyConfig::default();
        config.circuit_breaker.failure_threshold = 2;
        let layer = SafetyLayer::new(config);
        layer.record_failure("sop-restart-service").await;
        layer.record_failure("sop-restart-service").await;
        let check = layer.check("sop-restart-service", &["i-1".into()], false, false, &context()).await;
        assert_eq!(check.execution_mode, crate::domain::models::ExecutionMode::Blocked);
        assert_eq!(check.circuit_state, CircuitState::Open);
    }

    #[tokio::test]
    async fn force_bypasses_open_circuit_and_cooldown() {
        let mut config = SafetyConfig::default();
        config.circuit_breaker.failure_threshold = 1;
        let layer = SafetyLayer::new(config);
        layer.record_failure("sop-restart-service").await;
        layer.record_execution("sop-restart-service", &["i-1".into()]).await;
        let check = layer.check("sop-restart-service", &["i-1".into()], false, true, &context()).await;
        assert_ne!(check.execution_mode, crate::domain::models::ExecutionMode::Blocked);
    }

    #[tokio::test]
    async fn cooldown_blocks_repeat_execution() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        layer.record_execution("sop-restart-service", &["i-1".into()]).await;
        let check = layer.check("sop-restart-service", &["i-1".into()], false, false, &context()).await;
        assert_eq!(check.execution_mode, crate::domain::models::ExecutionMode::Blocked);
        assert!(check.cooldown_remaining_seconds.unwrap() > 0);
    }

    #[tokio::test]
    async fn approval_lifecycle() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        let approval = layer.request_approval("sop-terminate-instance", serde_json::json!({})).await;
        assert_eq!(layer.get_pending_approvals().await.len(), 1);
        let approved = layer.approve(approval.approval_id, "oncall").await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert!(layer.get_pending_approvals().await.is_empty());
        assert!(layer.approve(approval.approval_id, "oncall").await.is_err());
    }

    #[tokio::test]
    async fn stats_is_read_only() {
        let layer = SafetyLayer::new(SafetyConfig::default());
        layer.check("sop-describe-instances", &["i-1".into()], false, false, &context()).await;
        let first = layer.stats().await;
        let second = layer.stats().await;
        assert_eq!(first.total_checks, second.total_checks);
    }
}
