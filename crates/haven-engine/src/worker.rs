//! Clip processing: assemble, score, and dispose.
//!
//! Each job runs the full post-capture path for one recording. Every
//! failure in here is terminal for this clip only; the frame loop and other
//! in-flight clips are unaffected.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{error, info, warn};

use haven_media::ClipAssembler;
use haven_models::ClipCandidate;

use crate::ledger_controller::{accept_or_log, AlertSink, ThreatLedgerController, ThreatStore};
use crate::queue::{ClipJob, ProcessClip};
use crate::scorer::ClipScorer;

/// Runs the scoring gate and ledger hand-off for completed recordings.
pub struct ClipProcessor<S, T, A> {
    assembler: ClipAssembler,
    scorer: S,
    controller: ThreatLedgerController<T, A>,
    score_threshold: u8,
}

impl<S: ClipScorer, T: ThreatStore, A: AlertSink> ClipProcessor<S, T, A> {
    pub fn new(
        assembler: ClipAssembler,
        scorer: S,
        controller: ThreatLedgerController<T, A>,
        score_threshold: u8,
    ) -> Self {
        Self {
            assembler,
            scorer,
            controller,
            score_threshold,
        }
    }

    /// Score a finished clip and either discard it or fold it into the
    /// ledger. Scores at or below the threshold delete the file with no
    /// record of the rejection.
    pub(crate) async fn score_and_dispose(
        &self,
        clip: PathBuf,
        metadata: Option<Map<String, Value>>,
    ) {
        let score = match self.scorer.score(&clip, metadata.as_ref()).await {
            Ok(score) => score,
            Err(e) => {
                warn!("Scoring failed, abandoning capture: {}", e);
                remove_if_present(&clip).await;
                return;
            }
        };

        if score.score <= self.score_threshold {
            info!(
                "Clip {} scored {} (<= {}), discarded",
                clip.display(),
                score.score,
                self.score_threshold
            );
            remove_if_present(&clip).await;
            return;
        }

        let candidate = ClipCandidate {
            score: score.score,
            explanation: score.explanation,
            path: clip,
            metadata,
        };

        accept_or_log(&self.controller, candidate).await;
    }
}

#[async_trait]
impl<S, T, A> ProcessClip for ClipProcessor<S, T, A>
where
    S: ClipScorer,
    T: ThreatStore,
    A: AlertSink,
{
    async fn process(&self, job: ClipJob) {
        let clip = match self.assembler.assemble(&job.frames).await {
            Ok(clip) => clip,
            Err(e) => {
                error!("Clip assembly failed, capture discarded: {}", e);
                return;
            }
        };

        self.score_and_dispose(clip, job.metadata).await;
    }
}

async fn remove_if_present(clip: &std::path::Path) {
    match fs::remove_file(clip).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete clip {}: {}", clip.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult};
    use crate::ledger_controller::ThreatLedgerController;
    use crate::scorer::ClipScore;
    use crate::state::SharedState;
    use haven_ledger::{LedgerResult, NewThreat};
    use haven_models::ThreatId;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct ScriptedScorer {
        score: Option<u8>,
    }

    #[async_trait]
    impl ClipScorer for ScriptedScorer {
        async fn score(
            &self,
            _clip: &Path,
            _metadata: Option<&Map<String, Value>>,
        ) -> EngineResult<ClipScore> {
            match self.score {
                Some(score) => Ok(ClipScore {
                    score,
                    explanation: "scripted".to_string(),
                }),
                None => Err(EngineError::scoring_failed("scorer offline")),
            }
        }
    }

    #[derive(Default)]
    struct NullStore {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl ThreatStore for NullStore {
        async fn create(&self, _threat: &NewThreat) -> LedgerResult<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update(
            &self,
            _id: &ThreatId,
            _score: i64,
            _explanation: &str,
            _videos: &[String],
            _metadata: Option<&Map<String, Value>>,
            _replace_videos: bool,
        ) -> LedgerResult<()> {
            Ok(())
        }

        async fn await_visible(&self, _id: &ThreatId) -> bool {
            true
        }
    }

    struct NullAlerts;

    #[async_trait]
    impl AlertSink for NullAlerts {
        async fn notify(&self, _threat_id: &ThreatId) {}
    }

    fn processor(
        dir: &TempDir,
        score: Option<u8>,
    ) -> ClipProcessor<ScriptedScorer, NullStore, NullAlerts> {
        let state = Arc::new(SharedState::new(Duration::from_secs(10), 75));
        let controller = ThreatLedgerController::new(
            state,
            NullStore::default(),
            NullAlerts,
            dir.path().to_path_buf(),
        );
        ClipProcessor::new(
            ClipAssembler::new(dir.path().join("staging"), 15),
            ScriptedScorer { score },
            controller,
            6,
        )
    }

    async fn staged_clip(dir: &TempDir) -> PathBuf {
        let staging = dir.path().join("staging");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        let clip = staging.join("clip_1.mp4");
        tokio::fs::write(&clip, b"video").await.unwrap();
        clip
    }

    #[tokio::test]
    async fn test_low_score_deletes_clip_and_touches_no_ledger() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir, Some(5));
        let clip = staged_clip(&dir).await;

        processor.score_and_dispose(clip.clone(), None).await;

        assert!(!clip.exists(), "rejected clip must be deleted");
        assert_eq!(processor.controller.store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_threshold_score_is_still_rejected() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir, Some(6));
        let clip = staged_clip(&dir).await;

        processor.score_and_dispose(clip.clone(), None).await;
        assert!(!clip.exists());
    }

    #[tokio::test]
    async fn test_accepted_score_reaches_the_ledger() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir, Some(8));
        let clip = staged_clip(&dir).await;

        processor.score_and_dispose(clip.clone(), None).await;

        assert!(!clip.exists(), "clip moved out of staging");
        assert_eq!(processor.controller.store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scorer_failure_is_non_fatal_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir, None);
        let clip = staged_clip(&dir).await;

        processor.score_and_dispose(clip.clone(), None).await;

        assert!(!clip.exists(), "in-flight clip deleted on scorer failure");
        assert_eq!(processor.controller.store.creates.load(Ordering::SeqCst), 0);
    }
}
