//! `DetectResult`: a `CorrelatedEvent` plus detection metadata, cached by
//! `DetectAgent` with TTL/freshness semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::correlated_event::CorrelatedEvent;
use super::telemetry::Anomaly;

/// What triggered a detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectSource {
    ProactiveScan,
    AlarmTrigger,
    Manual,
}

/// Freshness bucket derived purely from `age` and `ttl_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Warm,
    Stale,
}

/// Cached outcome of one `DetectAgent::run_detection` call.
///
/// Created exclusively by `DetectAgent`; shared by reference; never mutated
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResult {
    pub detect_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: DetectSource,
    pub region: String,
    pub ttl_seconds: u64,
    pub correlated_event: Option<CorrelatedEvent>,
    pub anomalies_detected: Vec<Anomaly>,
    pub error: Option<String>,
}

/// Default time-to-live for a `DetectResult`, per the collection surface.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Age threshold below which a result is considered `fresh` rather than
/// merely `warm`.
const FRESH_THRESHOLD_SECONDS: i64 = 60;

impl DetectResult {
    /// Age of this result in whole seconds, clamped to zero for clock skew.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds().max(0)
    }

    /// `age > ttl_seconds`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        is_stale(self.age_seconds(now), self.ttl_seconds)
    }

    /// `fresh` (<60s), `warm` (<ttl), or `stale` (>=ttl).
    pub fn freshness_label(&self, now: DateTime<Utc>) -> Freshness {
        freshness_label(self.age_seconds(now), self.ttl_seconds)
    }
}

/// Pure staleness predicate, exposed standalone so the idempotence law in
/// the testable-properties set can be checked without constructing a full
/// `DetectResult`.
pub fn is_stale(age_seconds: i64, ttl_seconds: u64) -> bool {
    age_seconds > ttl_seconds as i64
}

/// Pure freshness classification, see `DetectResult::freshness_label`.
pub fn freshness_label(age_seconds: i64, ttl_seconds: u64) -> Freshness {
    if age_seconds < FRESH_THRESHOLD_SECONDS {
        Freshness::Fresh
    } else if age_seconds < ttl_seconds as i64 {
        Freshness::Warm
    } else {
        Freshness::Stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_label_boundaries() {
        assert_eq!(freshness_label(0, 300), Freshness::Fresh);
        assert_eq!(freshness_label(59, 300), Freshness::Fresh);
        assert_eq!(freshness_label(60, 300), Freshness::Warm);
        assert_eq!(freshness_label(299, 300), Freshness::Warm);
        assert_eq!(freshness_label(300, 300), Freshness::Stale);
        assert_eq!(freshness_label(301, 300), Freshness::Stale);
    }

    #[test]
    fn is_stale_matches_freshness_label() {
        assert!(!is_stale(300, 300));
        assert!(is_stale(301, 300));
    }
}
