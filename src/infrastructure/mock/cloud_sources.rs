//! Mock `CloudDataSource`: one configurable instance per source, so a
//! demo/test wiring can hand `EventCorrelator` a `HashMap<SourceName,
//! Arc<dyn CloudDataSource>>` without touching any real cloud SDK.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::models::SourceName;
use crate::domain::ports::{CloudDataSource, CollectionContext, SourceFetchError, SourcePayload};

/// A single mock telemetry source. Holds a canned `SourcePayload` to return,
/// and optional failure/latency injection for exercising the correlator's
/// partial-failure and timeout paths.
pub struct MockCloudSource {
    name: SourceName,
    payload: RwLock<SourcePayload>,
    fail: RwLock<Option<String>>,
    delay: RwLock<Option<Duration>>,
}

impl MockCloudSource {
    pub fn new(name: SourceName, payload: SourcePayload) -> Self {
        Self {
            name,
            payload: RwLock::new(payload),
            fail: RwLock::new(None),
            delay: RwLock::new(None),
        }
    }

    /// Replaces the canned payload returned by subsequent `fetch` calls.
    pub async fn set_payload(&self, payload: SourcePayload) {
        *self.payload.write().await = payload;
    }

    /// Makes the next `fetch` (and every one after, until cleared) return
    /// this error instead of the canned payload.
    pub async fn set_failure(&self, message: Option<String>) {
        *self.fail.write().await = message;
    }

    /// Makes `fetch` sleep before returning, to exercise per-source soft
    /// timeouts deterministically in tests.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl CloudDataSource for MockCloudSource {
    fn name(&self) -> SourceName {
        self.name
    }

    async fn fetch(&self, _ctx: &CollectionContext) -> Result<SourcePayload, SourceFetchError> {
        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.fail.read().await.clone() {
            return Err(SourceFetchError(message));
        }
        Ok(self.payload.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> CollectionContext {
        CollectionContext {
            region: "us-east-1".into(),
            services: None,
            lookback_minutes: 15,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn returns_canned_payload_by_default() {
        let source = MockCloudSource::new(SourceName::Metrics, SourcePayload::Metrics(vec![]));
        let result = source.fetch(&ctx()).await.unwrap();
        assert!(matches!(result, SourcePayload::Metrics(points) if points.is_empty()));
    }

    #[tokio::test]
    async fn set_failure_overrides_payload() {
        let source = MockCloudSource::new(SourceName::Alarms, SourcePayload::Alarms(vec![]));
        source.set_failure(Some("throttled".into())).await;
        let err = source.fetch(&ctx()).await.unwrap_err();
        assert_eq!(err.0, "throttled");
    }
}
