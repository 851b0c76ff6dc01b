//! Output contract of the external RCA (root-cause analysis) analyzer.

use serde::{Deserialize, Serialize};

use super::telemetry::Severity;

/// Qualitative bucket derived from `RCAResult::confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Acceptable,
    Escalate,
}

/// Confidence at or above which a result is considered high-confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;
/// Confidence at or above which a result is acceptable without escalation.
pub const ACCEPTABLE_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Classifies a confidence score per the fixed thresholds in the data model.
pub fn confidence_band(confidence: f64) -> ConfidenceBand {
    if confidence >= HIGH_CONFIDENCE_THRESHOLD {
        ConfidenceBand::High
    } else if confidence >= ACCEPTABLE_CONFIDENCE_THRESHOLD {
        ConfidenceBand::Acceptable
    } else {
        ConfidenceBand::Escalate
    }
}

/// A suggested remediation action, as proposed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    pub action: String,
    pub auto_execute: bool,
    pub params: serde_json::Value,
    pub conditions: Vec<String>,
    pub rollback: Option<String>,
    pub suggestion: Option<String>,
    pub checklist: Option<Vec<String>>,
    pub fallback: Option<String>,
}

/// Output of `RcaAnalyzer::analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RCAResult {
    pub pattern_id: String,
    pub pattern_name: String,
    pub root_cause: String,
    pub severity: Severity,
    pub confidence: f64,
    pub matched_symptoms: Vec<String>,
    pub evidence: Vec<String>,
    pub affected_resources: Vec<String>,
    pub remediation: Option<Remediation>,
    pub model_id: String,
}

impl RCAResult {
    /// Resources to target for safety checks and execution: the analyzer's
    /// explicit `affected_resources`, falling back to the symptom list
    /// named in the matched pattern when the analyzer left it empty.
    pub fn resource_ids(&self) -> &[String] {
        if self.affected_resources.is_empty() {
            &self.matched_symptoms
        } else {
            &self.affected_resources
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_band_boundaries() {
        assert_eq!(confidence_band(0.85), ConfidenceBand::High);
        assert_eq!(confidence_band(0.84), ConfidenceBand::Acceptable);
        assert_eq!(confidence_band(0.70), ConfidenceBand::Acceptable);
        assert_eq!(confidence_band(0.69), ConfidenceBand::Escalate);
    }

    #[test]
    fn resource_ids_falls_back_to_symptoms() {
        let result = RCAResult {
            pattern_id: "p1".into(),
            pattern_name: "cpu spike".into(),
            root_cause: "runaway worker".into(),
            severity: Severity::High,
            confidence: 0.9,
            matched_symptoms: vec!["i-abc".into()],
            evidence: vec![],
            affected_resources: vec![],
            remediation: None,
            model_id: "m1".into(),
        };
        assert_eq!(result.resource_ids(), &["i-abc".to_string()]);
    }
}
