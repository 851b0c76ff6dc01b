//! `MatchedSOP`: the output of the external SOP bridge, annotated by the
//! orchestrator and the safety layer.

use serde::{Deserialize, Serialize};

use super::safety::RiskLevel;
use super::telemetry::Severity;

/// How the SOP bridge arrived at this match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactPattern,
    Keyword,
    LlmInferred,
}

/// One candidate remediation procedure returned by the SOP bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedSOP {
    pub sop_id: String,
    pub name: String,
    pub severity: Severity,
    pub match_confidence: f64,
    pub match_type: MatchType,
    /// Filled in by `IncidentOrchestrator` Stage 3 annotation.
    pub auto_execute: bool,
    /// Filled in by `SafetyLayer` during Stage 4.
    pub risk_level: Option<RiskLevel>,
}
