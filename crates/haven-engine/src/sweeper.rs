//! Cleanup sweeper.
//!
//! Background loop that demotes threats to inactive once they have gone
//! quiet. Runs on its own timer, touches only the external store, and never
//! deletes evidence or records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use haven_ledger::{LedgerResult, ThreatRepository};
use haven_models::{ThreatId, ThreatRecord};

/// The slice of the ledger the sweeper needs.
#[async_trait]
pub trait SweepStore: Send + Sync {
    async fn list_active(&self) -> LedgerResult<Vec<ThreatRecord>>;
    async fn mark_inactive(&self, id: &ThreatId) -> LedgerResult<()>;
}

#[async_trait]
impl SweepStore for ThreatRepository {
    async fn list_active(&self) -> LedgerResult<Vec<ThreatRecord>> {
        ThreatRepository::list_active(self).await
    }

    async fn mark_inactive(&self, id: &ThreatId) -> LedgerResult<()> {
        ThreatRepository::mark_inactive(self, id).await
    }
}

/// Periodically closes threats whose `last_seen` fell outside the
/// inactivity window.
pub struct CleanupSweeper<S> {
    store: S,
    poll_interval: Duration,
    inactivity_window: chrono::Duration,
    enabled: bool,
}

impl<S: SweepStore> CleanupSweeper<S> {
    pub fn new(store: S, poll_interval: Duration, inactivity_window: Duration) -> Self {
        let enabled = std::env::var("ENABLE_CLEANUP_SWEEPER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            store,
            poll_interval,
            inactivity_window: chrono::Duration::from_std(inactivity_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
            enabled,
        }
    }

    /// Run until the shutdown signal flips. Spawn as a background task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            info!("Cleanup sweeper is disabled");
            return;
        }

        info!("Starting cleanup sweeper (interval: {:?})", self.poll_interval);

        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Cleanup sweeper shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Cleanup sweep error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single sweep. Returns the number of threats closed.
    pub async fn sweep_once(&self) -> LedgerResult<u32> {
        let active = self.store.list_active().await?;
        if active.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut closed = 0u32;

        for threat in active {
            // Already closed records can still show up in a stale listing
            if !threat.active {
                continue;
            }

            let quiet = match threat.last_seen {
                Some(last_seen) => now.signed_duration_since(last_seen) > self.inactivity_window,
                // A record that never got a last_seen stamp counts as silent
                None => true,
            };

            if !quiet {
                continue;
            }

            match self.store.mark_inactive(&threat.id).await {
                Ok(()) => {
                    info!("Threat marked inactive: {}", threat.id);
                    closed += 1;
                }
                Err(e) => {
                    error!("Failed to mark threat {} inactive: {}", threat.id, e);
                }
            }
        }

        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::Mutex;

    struct FakeStore {
        active: Vec<ThreatRecord>,
        closed: Mutex<Vec<ThreatId>>,
    }

    #[async_trait]
    impl SweepStore for FakeStore {
        async fn list_active(&self) -> LedgerResult<Vec<ThreatRecord>> {
            Ok(self.active.clone())
        }

        async fn mark_inactive(&self, id: &ThreatId) -> LedgerResult<()> {
            self.closed.lock().unwrap().push(id.clone());
            Ok(())
        }
    }

    fn threat(id: &str, active: bool, last_seen_secs_ago: Option<i64>) -> ThreatRecord {
        ThreatRecord {
            id: ThreatId::from(id),
            score: 8,
            explanation: String::new(),
            videos: vec![],
            metadata: Map::new(),
            active,
            start_time: None,
            end_time: None,
            last_seen: last_seen_secs_ago
                .map(|secs| Utc::now() - chrono::Duration::seconds(secs)),
            confirms: 0,
            denies: 0,
        }
    }

    fn sweeper(active: Vec<ThreatRecord>) -> CleanupSweeper<FakeStore> {
        CleanupSweeper::new(
            FakeStore {
                active,
                closed: Mutex::new(Vec::new()),
            },
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_stale_threat_is_closed() {
        let sweeper = sweeper(vec![threat("old", true, Some(6))]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(
            sweeper.store.closed.lock().unwrap().as_slice(),
            &[ThreatId::from("old")]
        );
    }

    #[tokio::test]
    async fn test_fresh_threat_is_left_active() {
        let sweeper = sweeper(vec![threat("fresh", true, Some(4))]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert!(sweeper.store.closed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_batch_closes_only_the_stale() {
        let sweeper = sweeper(vec![
            threat("old", true, Some(6)),
            threat("fresh", true, Some(4)),
        ]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_on_already_inactive_records() {
        let sweeper = sweeper(vec![threat("done", false, Some(100))]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert!(sweeper.store.closed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_last_seen_counts_as_silent() {
        let sweeper = sweeper(vec![threat("unseen", true, None)]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing_is_a_no_op() {
        let sweeper = sweeper(vec![]);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }
}
