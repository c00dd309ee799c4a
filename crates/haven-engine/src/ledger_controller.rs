//! Threat ledger controller.
//!
//! Owns the create-vs-update decision for accepted clips. The decision runs
//! under the shared-state lock (see `SharedState::fold_candidate`); the
//! resulting file moves and store writes happen under a dedicated write
//! guard so concurrent clip workers cannot interleave ledger updates, while
//! the frame loop never waits on ledger I/O.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{error, info, warn};

use haven_alert::{AlertDispatcher, Notifier, PartyDirectory};
use haven_ledger::{LedgerResult, NewThreat, ThreatRepository};
use haven_models::{ClipCandidate, ThreatId};

use crate::error::EngineResult;
use crate::state::SharedState;

/// The slice of the ledger the controller needs.
#[async_trait]
pub trait ThreatStore: Send + Sync {
    async fn create(&self, threat: &NewThreat) -> LedgerResult<()>;

    #[allow(clippy::too_many_arguments)]
    async fn update(
        &self,
        id: &ThreatId,
        score: i64,
        explanation: &str,
        videos: &[String],
        metadata: Option<&Map<String, Value>>,
        replace_videos: bool,
    ) -> LedgerResult<()>;

    async fn await_visible(&self, id: &ThreatId) -> bool;
}

#[async_trait]
impl ThreatStore for ThreatRepository {
    async fn create(&self, threat: &NewThreat) -> LedgerResult<()> {
        ThreatRepository::create(self, threat).await
    }

    async fn update(
        &self,
        id: &ThreatId,
        score: i64,
        explanation: &str,
        videos: &[String],
        metadata: Option<&Map<String, Value>>,
        replace_videos: bool,
    ) -> LedgerResult<()> {
        ThreatRepository::update(self, id, score, explanation, videos, metadata, replace_videos)
            .await
    }

    async fn await_visible(&self, id: &ThreatId) -> bool {
        ThreatRepository::await_visible(self, id).await
    }
}

/// Fires proximity alerts for a freshly created threat.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, threat_id: &ThreatId);
}

/// Production alert sink: re-read the record from the ledger, then let the
/// dispatcher fan out. Failures are logged, never propagated.
pub struct LedgerAlerts<D, N> {
    threats: ThreatRepository,
    dispatcher: AlertDispatcher<D, N>,
}

impl<D: PartyDirectory, N: Notifier> LedgerAlerts<D, N> {
    pub fn new(threats: ThreatRepository, dispatcher: AlertDispatcher<D, N>) -> Self {
        Self {
            threats,
            dispatcher,
        }
    }
}

#[async_trait]
impl<D: PartyDirectory, N: Notifier> AlertSink for LedgerAlerts<D, N> {
    async fn notify(&self, threat_id: &ThreatId) {
        let threat = match self.threats.get(threat_id).await {
            Ok(Some(threat)) => threat,
            Ok(None) => {
                warn!("Threat {} not found for alerting", threat_id);
                return;
            }
            Err(e) => {
                warn!("Failed to load threat {} for alerting: {}", threat_id, e);
                return;
            }
        };

        match self.dispatcher.dispatch(&threat).await {
            Ok(sent) => info!("Alerted {} parties for threat {}", sent, threat_id),
            Err(e) => warn!("Alert dispatch for threat {} failed: {}", threat_id, e),
        }
    }
}

/// Folds accepted candidates into the ledger.
pub struct ThreatLedgerController<T, A> {
    state: Arc<SharedState>,
    pub(crate) store: T,
    pub(crate) alerts: A,
    media_root: PathBuf,
    write_guard: tokio::sync::Mutex<()>,
}

impl<T: ThreatStore, A: AlertSink> ThreatLedgerController<T, A> {
    pub fn new(state: Arc<SharedState>, store: T, alerts: A, media_root: PathBuf) -> Self {
        Self {
            state,
            store,
            alerts,
            media_root,
            write_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Accept a scored candidate: decide create-vs-update, move the clip
    /// into the threat's directory, delete evicted files, persist the full
    /// evidence set, and alert exactly once on creation.
    pub async fn accept(&self, candidate: ClipCandidate) -> EngineResult<()> {
        let _guard = self.write_guard.lock().await;

        let plan = self.state.fold_candidate(candidate, &self.media_root);

        fs::create_dir_all(self.media_root.join(plan.threat_id.as_str())).await?;
        haven_media::move_file(&plan.source, &plan.dest).await?;

        for evicted in &plan.evicted {
            match fs::remove_file(evicted).await {
                Ok(()) => info!("Removed lower scoring clip: {}", evicted.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove evicted clip {}: {}", evicted.display(), e),
            }
        }

        if plan.created {
            self.store
                .create(&NewThreat {
                    id: plan.threat_id.clone(),
                    score: plan.score as i64,
                    explanation: plan.explanation.clone(),
                    videos: plan.retained.clone(),
                    metadata: plan.metadata.clone(),
                })
                .await?;

            self.store.await_visible(&plan.threat_id).await;

            info!("New threat created: {}", plan.threat_id);
            self.alerts.notify(&plan.threat_id).await;
        } else {
            self.store
                .update(
                    &plan.threat_id,
                    plan.score as i64,
                    &plan.explanation,
                    &plan.retained,
                    plan.metadata.as_ref(),
                    true,
                )
                .await?;

            info!(
                "Threat {} updated, evidence: {:?}",
                plan.threat_id, plan.retained
            );
        }

        Ok(())
    }
}

/// Log-and-continue wrapper for the clip workers.
pub async fn accept_or_log<T: ThreatStore, A: AlertSink>(
    controller: &ThreatLedgerController<T, A>,
    candidate: ClipCandidate,
) {
    if let Err(e) = controller.accept(candidate).await {
        error!("Ledger update failed, capture abandoned: {}", e);
    }
}
