//! `EventCorrelator`: concurrent multi-source telemetry collector.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::models::{
    Anomaly, CorrelatedEvent, RecentChange, Severity, SourceName, SourceStatus,
};
use crate::domain::ports::{CloudDataSource, CollectionContext, SourcePayload};

/// Per-source soft timeout, applied independently of the correlator's hard
/// collection budget.
#[derive(Debug, Clone)]
pub struct SoftTimeouts {
    pub metrics: Duration,
    pub alarms: Duration,
    pub trail: Duration,
    pub anomaly: Duration,
    pub health: Duration,
}

impl Default for SoftTimeouts {
    fn default() -> Self {
        Self {
            metrics: Duration::from_secs(5),
            alarms: Duration::from_secs(3),
            trail: Duration::from_secs(6),
            anomaly: Duration::from_secs(5),
            health: Duration::from_secs(4),
        }
    }
}

impl SoftTimeouts {
    fn for_source(&self, name: SourceName) -> Duration {
        match name {
            SourceName::Metrics => self.metrics,
            SourceName::Alarms => self.alarms,
            SourceName::Trail => self.trail,
            SourceName::Anomaly => self.anomaly,
            SourceName::Health => self.health,
        }
    }
}

/// Anomaly threshold table entry: metric name -> firing threshold.
#[derive(Debug, Clone)]
pub struct AnomalyThreshold {
    pub metric_name: &'static str,
    pub threshold: f64,
}

/// Default anomaly thresholds, per the collection algorithm's defaults.
pub fn default_anomaly_thresholds() -> Vec<AnomalyThreshold> {
    vec![
        AnomalyThreshold { metric_name: "CPUUtilization", threshold: 80.0 },
        AnomalyThreshold { metric_name: "MemoryUtilization", threshold: 85.0 },
        AnomalyThreshold { metric_name: "DiskSpaceUtilization", threshold: 90.0 },
        AnomalyThreshold { metric_name: "Errors", threshold: 10.0 },
        AnomalyThreshold { metric_name: "ThrottledRequests", threshold: 0.0 },
    ]
}

/// The trail source's bounded retry policy: transient provider throttling
/// would otherwise produce spurious empty trail events that corrupt the
/// "recent changes" projection downstream.
const TRAIL_RETRY_ATTEMPTS: u32 = 2;
const TRAIL_RETRY_BACKOFF_MS: u64 = 200;

/// Hard wall-clock budget for one collection cycle, regardless of
/// per-source soft timeouts.
const HARD_COLLECTION_BUDGET: Duration = Duration::from_secs(30);

/// Fans out to the configured cloud data sources in parallel and returns a
/// single structured `CorrelatedEvent`. Never fails: individual source
/// failures are recorded in `source_status` and the aggregate is still
/// returned.
pub struct EventCorrelator {
    sources: HashMap<SourceName, Arc<dyn CloudDataSource>>,
    soft_timeouts: SoftTimeouts,
    anomaly_thresholds: Vec<AnomalyThreshold>,
    hard_timeout: Duration,
}

impl EventCorrelator {
    pub fn new(
        sources: HashMap<SourceName, Arc<dyn CloudDataSource>>,
        soft_timeouts: SoftTimeouts,
    ) -> Self {
        Self {
            sources,
            soft_timeouts,
            anomaly_thresholds: default_anomaly_thresholds(),
            hard_timeout: HARD_COLLECTION_BUDGET,
        }
    }

    /// Overrides the hard wall-clock collection budget, per
    /// `collection.hard_timeout_ms`. Kept as a builder rather than a
    /// constructor parameter so the common two-argument call shape used
    /// throughout the test suite keeps working unchanged.
    #[must_use]
    pub fn with_hard_timeout(mut self, hard_timeout: Duration) -> Self {
        self.hard_timeout = hard_timeout;
        self
    }

    /// Collects all requested sources in parallel within the hard budget.
    /// `services` narrows which resources the collection targets; `None`
    /// means "all known resources". Never returns `Err` — collection
    /// failures live inside the returned `CorrelatedEvent::source_status`.
    pub async fn collect(
        &self,
        region: &str,
        services: Option<Vec<String>>,
        lookback_minutes: u32,
        include_trail: bool,
        include_health: bool,
    ) -> CorrelatedEvent {
        let start = Instant::now();
        let collection_id = random_collection_id();
        let ctx = CollectionContext {
            region: region.to_string(),
            services,
            lookback_minutes,
            now: Utc::now(),
        };

        let requested: Vec<SourceName> = self
            .sources
            .keys()
            .copied()
            .filter(|name| match name {
                SourceName::Trail => include_trail,
                SourceName::Health => include_health,
                _ => true,
            })
            .collect();

        let mut handles = Vec::with_capacity(requested.len());
        for name in &requested {
            let Some(source) = self.sources.get(name).cloned() else {
                continue;
            };
            let ctx = ctx.clone();
            let soft_timeout = self.soft_timeouts.for_source(*name);
            let name = *name;
            handles.push((
                name,
                tokio::spawn(async move {
                    tokio::time::timeout(soft_timeout, fetch_with_retry(&*source, &ctx, name)).await
                }),
            ));
        }

        let outcome = tokio::time::timeout(self.hard_timeout, join_all(handles)).await;

        let mut source_status = HashMap::new();
        let mut source_errors = HashMap::new();
        let mut metrics = Vec::new();
        let mut alarms = Vec::new();
        let mut trail_events = Vec::new();
        let mut health_events = Vec::new();

        match outcome {
            Ok(results) => {
                for (name, outcome) in results {
                    record_outcome(
                        name,
                        outcome,
                        &mut source_status,
                        &mut source_errors,
                        &mut metrics,
                        &mut alarms,
                        &mut trail_events,
                        &mut health_events,
                    );
                }
            }
            Err(_) => {
                warn!(collection_id, "collection exceeded hard budget, returning partial results");
                for name in &requested {
                    source_status.entry(*name).or_insert(SourceStatus::Timeout);
                }
            }
        }

        // Any requested source with no recorded outcome (e.g. the join
        // itself was cancelled by the hard timeout mid-flight) still needs
        // an entry per the "every requested source appears" invariant.
        for name in &requested {
            source_status.entry(*name).or_insert(SourceStatus::Timeout);
        }

        let anomalies = self.derive_anomalies(&metrics);
        let recent_changes = derive_recent_changes(&trail_events);

        CorrelatedEvent {
            collection_id,
            region: region.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            source_status,
            source_errors,
            metrics,
            alarms,
            trail_events,
            health_events,
            anomalies,
            recent_changes,
        }
    }

    fn derive_anomalies(&self, metrics: &[crate::domain::models::MetricDataPoint]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for point in metrics {
            let Some(entry) = self
                .anomaly_thresholds
                .iter()
                .find(|t| t.metric_name == point.metric_name)
            else {
                continue;
            };
            if point.value > entry.threshold {
                let severity = Anomaly::classify_severity(point.value, entry.threshold);
                anomalies.push(Anomaly {
                    anomaly_type: format!("{}_exceeded", entry.metric_name),
                    resource: point.resource_id.clone(),
                    metric: point.metric_name.clone(),
                    value: point.value,
                    threshold: entry.threshold,
                    severity,
                    description: format!(
                        "{} on {} is {} (threshold {})",
                        point.metric_name, point.resource_id, point.value, entry.threshold
                    ),
                });
            }
        }
        anomalies
    }
}

fn derive_recent_changes(
    trail_events: &[crate::domain::models::TrailEvent],
) -> Vec<RecentChange> {
    trail_events
        .iter()
        .filter(|e| !e.read_only)
        .map(|e| RecentChange {
            event_name: e.event_name.clone(),
            user_identity: e.user_identity.clone(),
            resource_id: e.resource_id.clone(),
            event_time: e.event_time,
            error_code: e.error_code.clone(),
            error_message: e.error_message.clone(),
        })
        .collect()
}

type SourceFetchOutcome = Result<
    Result<Result<SourcePayload, crate::domain::ports::SourceFetchError>, tokio::time::error::Elapsed>,
    tokio::task::JoinError,
>;

#[allow(clippy::too_many_arguments)]
fn record_outcome(
    name: SourceName,
    outcome: SourceFetchOutcome,
    source_status: &mut HashMap<SourceName, SourceStatus>,
    source_errors: &mut HashMap<SourceName, String>,
    metrics: &mut Vec<crate::domain::models::MetricDataPoint>,
    alarms: &mut Vec<crate::domain::models::AlarmInfo>,
    trail_events: &mut Vec<crate::domain::models::TrailEvent>,
    health_events: &mut Vec<crate::domain::models::HealthEvent>,
) {
    match outcome {
        Ok(Ok(Ok(payload))) => {
            source_status.insert(name, SourceStatus::Ok);
            match payload {
                SourcePayload::Metrics(points) => metrics.extend(points),
                SourcePayload::Alarms(a) => alarms.extend(a),
                SourcePayload::Trail(t) => trail_events.extend(t),
                SourcePayload::Anomaly(_) => {}
                SourcePayload::Health(h) => health_events.extend(h),
            }
        }
        Ok(Ok(Err(err))) => {
            source_status.insert(name, SourceStatus::Error);
            source_errors.insert(name, err.0);
        }
        Ok(Err(_elapsed)) => {
            source_status.insert(name, SourceStatus::Timeout);
        }
        Err(join_err) => {
            // A panicking source task is treated as an error, never
            // propagated: the correlator must never fail outright.
            source_status.insert(name, SourceStatus::Error);
            source_errors.insert(name, format!("source task panicked: {join_err}"));
        }
    }
}

async fn fetch_with_retry(
    source: &dyn CloudDataSource,
    ctx: &CollectionContext,
    name: SourceName,
) -> Result<SourcePayload, crate::domain::ports::SourceFetchError> {
    if name != SourceName::Trail {
        return source.fetch(ctx).await;
    }

    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(TRAIL_RETRY_BACKOFF_MS))
        .with_max_interval(Duration::from_millis(TRAIL_RETRY_BACKOFF_MS))
        .with_max_elapsed_time(Some(Duration::from_millis(
            TRAIL_RETRY_BACKOFF_MS * u64::from(TRAIL_RETRY_ATTEMPTS),
        )))
        .build();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.fetch(ctx).await {
            Ok(payload) => return Ok(payload),
            Err(err) if attempt <= TRAIL_RETRY_ATTEMPTS => {
                debug!(attempt, "trail source failed, retrying: {err}");
                if let Some(delay) = backoff.next_backoff() {
                    tokio::time::sleep(delay).await;
                } else {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

type SourceFetchHandle = tokio::task::JoinHandle<
    Result<Result<SourcePayload, crate::domain::ports::SourceFetchError>, tokio::time::error::Elapsed>,
>;

async fn join_all(handles: Vec<(SourceName, SourceFetchHandle)>) -> Vec<(SourceName, SourceFetchOutcome)> {
    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        results.push((name, handle.await));
    }
    results
}

fn random_collection_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MetricDataPoint;
    use chrono::Utc;

    fn point(metric_name: &str, value: f64) -> MetricDataPoint {
        MetricDataPoint {
            resource_id: "i-abc".into(),
            metric_name: metric_name.into(),
            namespace: "AWS/EC2".into(),
            value,
            unit: "Percent".into(),
            timestamp: Utc::now(),
            statistic: crate::domain::models::Statistic::Average,
        }
    }

    #[test]
    fn recent_changes_excludes_read_only_events() {
        let events = vec![
            crate::domain::models::TrailEvent {
                event_time: Utc::now(),
                event_name: "ModifyInstance".into(),
                user_identity: "alice".into(),
                resource_id: "i-abc".into(),
                error_code: None,
                error_message: None,
                read_only: false,
            },
            crate::domain::models::TrailEvent {
                event_time: Utc::now(),
                event_name: "DescribeInstance".into(),
                user_identity: "alice".into(),
                resource_id: "i-abc".into(),
                error_code: None,
                error_message: None,
                read_only: true,
            },
        ];
        let changes = derive_recent_changes(&events);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].event_name, "ModifyInstance");
    }

    #[test]
    fn collection_id_is_twelve_chars() {
        let id = random_collection_id();
        assert_eq!(id.len(), 12);
    }

    #[tokio::test]
    async fn collect_returns_empty_event_with_no_sources() {
        let correlator = EventCorrelator::new(HashMap::new(), SoftTimeouts::default());
        let event = correlator.collect("us-east-1", None, 15, true, true).await;
        assert!(event.metrics.is_empty());
        assert!(event.source_status.is_empty());
        assert_eq!(event.region, "us-east-1");
    }

    #[test]
    fn anomaly_threshold_table_matches_defaults() {
        let thresholds = default_anomaly_thresholds();
        assert_eq!(thresholds.len(), 5);
        assert!(thresholds.iter().any(|t| t.metric_name == "CPUUtilization" && t.threshold == 80.0));
    }

    #[test]
    fn derive_anomalies_fires_above_threshold() {
        let correlator = EventCorrelator::new(HashMap::new(), SoftTimeouts::default());
        let anomalies = correlator.derive_anomalies(&[point("CPUUtilization", 95.0)]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
    }
}
