use incident_pipeline::domain::models::{Anomaly, RiskLevel, Severity};
use incident_pipeline::services::classify_risk;
use proptest::prelude::*;

proptest! {
    /// Property: classify_risk is a total function — every sop id, however
    /// garbled, resolves to some risk level rather than panicking.
    #[test]
    fn prop_classify_risk_never_panics(sop_id in "sop-[a-z_]{0,30}") {
        let _ = classify_risk(&sop_id);
    }

    /// Property: a destructive verb anywhere in the id is never
    /// downgraded below L2, regardless of what surrounds it.
    #[test]
    fn prop_delete_verb_is_never_low_risk(prefix in "[a-z_]{0,10}", suffix in "[a-z_]{0,10}") {
        let sop_id = format!("sop-{prefix}delete{suffix}");
        let level = classify_risk(&sop_id);
        prop_assert!(level >= RiskLevel::L2, "delete-bearing id {sop_id} classified as {level:?}");
    }

    /// Property: classify_risk is deterministic — same input, same output.
    #[test]
    fn prop_classify_risk_is_deterministic(sop_id in "sop-[a-z_]{1,20}") {
        prop_assert_eq!(classify_risk(&sop_id), classify_risk(&sop_id));
    }

    /// Property: anomaly severity is monotonic in the value/threshold ratio.
    #[test]
    fn prop_anomaly_severity_monotonic(threshold in 1.0f64..1000.0, ratio_bump in 0.0f64..2.0) {
        let low = Anomaly::classify_severity(threshold * 0.5, threshold);
        let high = Anomaly::classify_severity(threshold * (1.1 + ratio_bump), threshold);
        prop_assert!(low <= Severity::Medium);
        prop_assert_eq!(high, Severity::High);
    }
}
