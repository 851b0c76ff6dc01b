//! `DetectAgent`: wraps `EventCorrelator` with single-flight coalescing,
//! TTL/freshness semantics, and cache persistence.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{DetectResult, DetectSource, Freshness};
use crate::infrastructure::detect_cache::DetectCache;
use crate::services::event_correlator::EventCorrelator;

/// `DetectAgent::health()` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Collecting,
}

/// Snapshot returned by `DetectAgent::health`.
#[derive(Debug, Clone)]
pub struct DetectHealth {
    pub status: AgentStatus,
    pub latest_detect_id: Option<Uuid>,
    pub latest_age_seconds: Option<i64>,
    pub latest_freshness: Option<Freshness>,
    pub cache_size: usize,
}

type InFlight = Shared<BoxFuture<'static, Arc<DetectResult>>>;

/// Wraps `EventCorrelator` with a single-flight mutex: at most one
/// detection is in flight per agent instance. Concurrent callers clone the
/// same in-flight `Shared` future and await it, so they observe exactly one
/// underlying `EventCorrelator::collect` call rather than merely being
/// serialized behind separate calls.
pub struct DetectAgent {
    correlator: Arc<EventCorrelator>,
    cache: Arc<DetectCache>,
    region: String,
    in_flight: Mutex<Option<InFlight>>,
    latest: Mutex<Option<Arc<DetectResult>>>,
}

impl DetectAgent {
    pub fn new(correlator: Arc<EventCorrelator>, cache: Arc<DetectCache>, region: String) -> Self {
        Self {
            correlator,
            cache,
            region,
            in_flight: Mutex::new(None),
            latest: Mutex::new(None),
        }
    }

    /// Runs (or joins an in-flight) detection cycle and returns the
    /// resulting `DetectResult`.
    pub async fn run_detection(
        &self,
        services: Option<Vec<String>>,
        lookback_minutes: u32,
        source: DetectSource,
        ttl_seconds: u64,
    ) -> Arc<DetectResult> {
        let fut = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.as_ref() {
                existing.clone()
            } else {
                let correlator = self.correlator.clone();
                let cache = self.cache.clone();
                let region = self.region.clone();
                let shared: InFlight = async move {
                    let result = collect_once(&correlator, &cache, &region, services, lookback_minutes, source, ttl_seconds).await;
                    Arc::new(result)
                }
                .boxed()
                .shared();
                *in_flight = Some(shared.clone());
                shared
            }
        };

        let result = fut.await;

        *self.in_flight.lock().await = None;

        let mut latest = self.latest.lock().await;
        *latest = Some(result.clone());

        result
    }

    /// Most recent detection result, regardless of staleness.
    pub async fn latest(&self) -> Option<Arc<DetectResult>> {
        self.latest.lock().await.clone()
    }

    /// Most recent detection result, only if it is not stale.
    pub async fn latest_fresh(&self) -> Option<Arc<DetectResult>> {
        let latest = self.latest.lock().await.clone()?;
        if latest.is_stale(Utc::now()) {
            None
        } else {
            Some(latest)
        }
    }

    /// Looks up a cached result by ID, reading through to the on-disk cache
    /// if it is not the in-memory latest.
    pub async fn get_by_id(&self, detect_id: Uuid) -> Option<Arc<DetectResult>> {
        if let Some(latest) = self.latest.lock().await.as_ref() {
            if latest.detect_id == detect_id {
                return Some(latest.clone());
            }
        }
        self.cache.read(detect_id).await.ok().map(Arc::new)
    }

    pub async fn health(&self) -> DetectHealth {
        let in_flight = self.in_flight.lock().await.is_some();
        let latest = self.latest.lock().await.clone();
        DetectHealth {
            status: if in_flight { AgentStatus::Collecting } else { AgentStatus::Idle },
            latest_detect_id: latest.as_ref().map(|r| r.detect_id),
            latest_age_seconds: latest.as_ref().map(|r| r.age_seconds(Utc::now())),
            latest_freshness: latest.as_ref().map(|r| r.freshness_label(Utc::now())),
            cache_size: self.cache.len().await,
        }
    }
}

async fn collect_once(
    correlator: &EventCorrelator,
    cache: &DetectCache,
    region: &str,
    services: Option<Vec<String>>,
    lookback_minutes: u32,
    source: DetectSource,
    ttl_seconds: u64,
) -> DetectResult {
    let detect_id = Uuid::new_v4();
    let timestamp = Utc::now();
    let event = correlator
        .collect(region, services, lookback_minutes, true, true)
        .await;

    let anomalies_detected = event.anomalies.clone();
    let error = if event.all_sources_failed() {
        Some("all sources failed".to_string())
    } else {
        None
    };

    let result = DetectResult {
        detect_id,
        timestamp,
        source,
        region: region.to_string(),
        ttl_seconds,
        correlated_event: Some(event),
        anomalies_detected,
        error,
    };

    match cache.write(&result).await {
        Ok(()) => info!(detect_id = %detect_id, "detect result cached"),
        Err(err) => warn!(detect_id = %detect_id, "failed to cache detect result: {err}"),
    }

    result
}
