//! Gateway state persistence.
//!
//! Breaker, metrics and ledger are written as one JSON document so a
//! restarted gateway resumes with the same circuit state and history.
//! Loading is best effort: a missing or unreadable file starts fresh.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::PersistenceConfig;
use crate::observability::{AttemptRecord, MetricsState};
use crate::payments::gateway::PaymentGateway;
use crate::resilience::CircuitState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Everything needed to rebuild a [`PaymentGateway`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySnapshot {
    pub breaker: BreakerSnapshot,
    #[serde(default)]
    pub metrics: MetricsState,
    #[serde(default)]
    pub ledger: Vec<AttemptRecord>,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a snapshot, logging and returning `None` on any failure.
pub fn load_snapshot(path: &Path) -> Option<GatewaySnapshot> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No saved gateway state, starting fresh");
        return None;
    }

    match read_snapshot(path) {
        Ok(snapshot) => {
            tracing::info!(
                path = %path.display(),
                state = %snapshot.breaker.state,
                attempts = snapshot.ledger.len(),
                "Loaded gateway state"
            );
            Some(snapshot)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable gateway state");
            None
        }
    }
}

fn read_snapshot(path: &Path) -> Result<GatewaySnapshot, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write a snapshot to a sibling temp file, then rename it into place.
pub fn save_snapshot(path: &Path, snapshot: &GatewaySnapshot) -> Result<(), PersistenceError> {
    let tmp = temp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Background task that saves gateway state on an interval and once more
/// on shutdown.
pub struct SnapshotWriter {
    gateway: Arc<PaymentGateway>,
    path: PathBuf,
    interval: Duration,
}

impl SnapshotWriter {
    pub fn new(gateway: Arc<PaymentGateway>, config: &PersistenceConfig) -> Self {
        Self {
            gateway,
            path: PathBuf::from(&config.path),
            interval: Duration::from_secs(config.save_interval_secs.max(1)),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            path = %self.path.display(),
            interval_secs = self.interval.as_secs(),
            "Snapshot writer starting"
        );

        let mut ticker = time::interval(self.interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.save();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Snapshot writer received shutdown signal, saving final state");
                    self.save();
                    break;
                }
            }
        }
    }

    /// Save the current state, logging instead of failing.
    pub fn save(&self) {
        match save_snapshot(&self.path, &self.gateway.snapshot()) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Saved gateway state"),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to save gateway state")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::payments::provider::SimulatedProvider;
    use crate::resilience::MockClock;
    use tempfile::tempdir;

    fn sample() -> GatewaySnapshot {
        let now = Utc::now();
        let mut metrics = MetricsState::new();
        metrics.record_attempt(false, now);
        metrics.record_transition(CircuitState::Closed, CircuitState::Open, now);
        GatewaySnapshot {
            breaker: BreakerSnapshot {
                state: CircuitState::Open,
                failure_count: 5,
                opened_at: Some(now),
            },
            metrics,
            ledger: vec![AttemptRecord {
                success: false,
                error: Some("Payment failed due to provider error.".into()),
                timestamp: now,
            }],
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let snapshot = sample();

        save_snapshot(&path, &snapshot).unwrap();
        assert!(!temp_path(&path).exists());
        assert_eq!(load_snapshot(&path), Some(snapshot));
    }

    #[test]
    fn test_missing_file_starts_fresh() {
        let dir = tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot(&path).is_none());
    }

    #[test]
    fn test_metrics_and_ledger_are_optional() {
        let json = r#"{"breaker":{"state":"HALF_OPEN","failureCount":5,"openedAt":null}}"#;
        let snapshot: GatewaySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.breaker.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.metrics, MetricsState::default());
        assert!(snapshot.ledger.is_empty());
    }

    #[test]
    fn test_inconsistent_metrics_reset_on_restore() {
        let json = r#"{
            "breaker": {"state": "CLOSED", "failureCount": 0, "openedAt": null},
            "metrics": {"totalAttempts": 10, "totalSuccesses": 1, "totalFailures": 1}
        }"#;
        let snapshot: GatewaySnapshot = serde_json::from_str(json).unwrap();
        let gateway = PaymentGateway::restore(
            &GatewayConfig::default(),
            Arc::new(SimulatedProvider::new(0.0)),
            Arc::new(MockClock::new()),
            snapshot,
        );

        let metrics = gateway.metrics();
        assert_eq!(
            metrics.total_attempts,
            metrics.total_successes + metrics.total_failures
        );
        assert_eq!(metrics.total_attempts, 0);
        assert_eq!(gateway.snapshot().metrics, MetricsState::new());
    }

    #[test]
    fn test_consistent_metrics_survive_restore() {
        let snapshot = sample();
        let gateway = PaymentGateway::restore(
            &GatewayConfig::default(),
            Arc::new(SimulatedProvider::new(0.0)),
            Arc::new(MockClock::new()),
            snapshot.clone(),
        );
        assert_eq!(gateway.snapshot().metrics, snapshot.metrics);
    }

    #[tokio::test]
    async fn test_writer_saves_on_shutdown() {
        let dir = tempdir().unwrap();
        let config = PersistenceConfig {
            enabled: true,
            path: dir.path().join("state.json").display().to_string(),
            save_interval_secs: 3600,
        };
        let gateway = Arc::new(PaymentGateway::with_clock(
            &GatewayConfig::default(),
            Arc::new(SimulatedProvider::new(0.0)),
            Arc::new(MockClock::new()),
        ));

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(SnapshotWriter::new(gateway.clone(), &config).run(rx));
        tx.send(()).unwrap();
        task.await.unwrap();

        let saved = load_snapshot(Path::new(&config.path)).unwrap();
        assert_eq!(saved, gateway.snapshot());
    }
}
