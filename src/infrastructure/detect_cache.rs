//! On-disk `DetectResult` cache: one JSON file per `detect_id`, written
//! atomically under an exclusive file lock.

use std::path::PathBuf;

use fs4::tokio::AsyncFileExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::domain::models::DetectResult;

/// Error surface for cache I/O, folded into `DetectError::CacheIo` /
/// `CacheCorrupt` by callers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persists `DetectResult`s as `<detect_id>.json` under a configured
/// directory. Writes go to `<detect_id>.json.tmp` first, are locked
/// exclusively, flushed, then renamed into place — so a reader never
/// observes a partially written file.
pub struct DetectCache {
    dir: PathBuf,
}

impl DetectCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, detect_id: Uuid) -> PathBuf {
        self.dir.join(format!("{detect_id}.json"))
    }

    /// Writes one result to the cache. Failures are the caller's
    /// responsibility to log and swallow — callers such as `DetectAgent`
    /// never propagate a cache-write failure.
    pub async fn write(&self, result: &DetectResult) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;

        let final_path = self.path_for(result.detect_id);
        let tmp_path = final_path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(result)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .await?;
        file.lock_exclusive()?;
        file.write_all(&body).await?;
        file.flush().await?;
        file.sync_all().await?;
        AsyncFileExt::unlock(&file)?;
        drop(file);

        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    /// Reads one result back by ID.
    pub async fn read(&self, detect_id: Uuid) -> Result<DetectResult, CacheError> {
        let mut file = fs::File::open(self.path_for(detect_id)).await?;
        let mut body = Vec::new();
        file.read_to_end(&mut body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Number of cached entries currently on disk.
    pub async fn len(&self) -> usize {
        let Ok(mut entries) = fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample_result() -> DetectResult {
        DetectResult {
            detect_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: crate::domain::models::DetectSource::Manual,
            region: "us-east-1".into(),
            ttl_seconds: 300,
            correlated_event: None,
            anomalies_detected: vec![],
            error: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DetectCache::new(dir.path().to_path_buf());
        let result = sample_result();

        cache.write(&result).await.unwrap();
        let read_back = cache.read(result.detect_id).await.unwrap();

        assert_eq!(read_back.detect_id, result.detect_id);
        assert_eq!(read_back.region, result.region);
    }

    #[tokio::test]
    async fn len_counts_written_entries() {
        let dir = tempdir().unwrap();
        let cache = DetectCache::new(dir.path().to_path_buf());
        assert_eq!(cache.len().await, 0);

        cache.write(&sample_result()).await.unwrap();
        cache.write(&sample_result()).await.unwrap();

        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn no_tmp_file_left_after_write() {
        let dir = tempdir().unwrap();
        let cache = DetectCache::new(dir.path().to_path_buf());
        let result = sample_result();
        cache.write(&result).await.unwrap();

        let tmp_path = dir.path().join(format!("{}.json.tmp", result.detect_id));
        assert!(!tmp_path.exists());
    }
}
