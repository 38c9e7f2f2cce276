use async_trait::async_trait;
use ritmo_core::{RitmoError, RitmoResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Cumulative counters for one control-loop run.
///
/// Counters survive a restart via a [`MetricsStore`]; the runtime state
/// (period, recovery flag) is re-derived by the controller on start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopMetrics {
    /// Completed cycles.
    pub cycles: u64,
    /// Hand-offs coordinated between workers.
    pub handoffs: u64,
    /// Successful collaboration rounds.
    pub collaborations: u64,
    /// Errors observed (worker failures, timeouts, absorbed cycle errors).
    pub errors: u64,
    /// Times the loop entered recovery mode.
    pub recoveries: u64,
    /// Current cycle period in milliseconds.
    pub period_ms: u64,
    /// Whether the loop is currently in recovery mode.
    pub recovery_mode: bool,
    /// Name of the last worker dispatched, if any.
    pub last_worker: Option<String>,
}

impl LoopMetrics {
    /// Reset all counters and flags, keeping only the given period.
    pub fn reset(&mut self, period_ms: u64) {
        *self = LoopMetrics {
            period_ms,
            ..LoopMetrics::default()
        };
    }
}

/// Persistence boundary for the metrics snapshot.
///
/// Saves are opportunistic: the controller calls [`MetricsStore::save`] each
/// cycle and ignores failures, so a broken store degrades observability but
/// never the loop.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Persist a snapshot.
    async fn save(&self, metrics: &LoopMetrics) -> RitmoResult<()>;
    /// Load the last snapshot, if one exists.
    async fn load(&self) -> RitmoResult<Option<LoopMetrics>>;
}

/// File-based metrics store (a single JSON file on disk).
pub struct FileMetricsStore {
    path: PathBuf,
}

impl FileMetricsStore {
    /// Create a store writing to the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MetricsStore for FileMetricsStore {
    async fn save(&self, metrics: &LoopMetrics) -> RitmoResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(metrics)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    async fn load(&self) -> RitmoResult<Option<LoopMetrics>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        let metrics: LoopMetrics = serde_json::from_str(&data).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Discarding unreadable metrics snapshot");
            RitmoError::Controller(format!("Failed to parse metrics snapshot: {e}"))
        })?;
        Ok(Some(metrics))
    }
}

/// A [`MetricsStore`] that persists nothing.
#[derive(Debug, Default)]
pub struct NullMetricsStore;

#[async_trait]
impl MetricsStore for NullMetricsStore {
    async fn save(&self, _metrics: &LoopMetrics) -> RitmoResult<()> {
        Ok(())
    }

    async fn load(&self) -> RitmoResult<Option<LoopMetrics>> {
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_period() {
        let mut metrics = LoopMetrics {
            cycles: 40,
            errors: 3,
            recoveries: 1,
            recovery_mode: true,
            period_ms: 2250,
            last_worker: Some("scout".into()),
            ..LoopMetrics::default()
        };
        metrics.reset(1000);
        assert_eq!(metrics, LoopMetrics {
            period_ms: 1000,
            ..LoopMetrics::default()
        });
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetricsStore::new(dir.path().join("metrics.json"));

        assert!(store.load().await.unwrap().is_none());

        let metrics = LoopMetrics {
            cycles: 12,
            handoffs: 2,
            errors: 1,
            period_ms: 1500,
            ..LoopMetrics::default()
        };
        store.save(&metrics).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, metrics);
    }

    #[tokio::test]
    async fn test_file_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetricsStore::new(dir.path().join("metrics.json"));

        let mut metrics = LoopMetrics::default();
        store.save(&metrics).await.unwrap();
        metrics.cycles = 5;
        store.save(&metrics).await.unwrap();

        assert_eq!(store.load().await.unwrap().unwrap().cycles, 5);
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = FileMetricsStore::new(path);
        assert!(store.load().await.is_err());
    }
}
