//! Shared pipeline state.
//!
//! One mutex guards the whole mutable unit: the per-track centroid map, the
//! recording state machine, and the current threat's evidence set. Callers
//! only see named atomic operations, so the invariants (single recording,
//! cooldown between attempts, bounded evidence) hold at this boundary rather
//! than by caller discipline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use haven_models::{Centroid, ClipCandidate, Frame, ThreatId, MAX_EVIDENCE_CLIPS};

use crate::tracker::displacements;

/// Everything the ledger controller needs to act on one accepted candidate,
/// computed in a single critical section.
#[derive(Debug)]
pub struct LedgerPlan {
    pub threat_id: ThreatId,
    /// True when this candidate opened a new threat.
    pub created: bool,
    /// Staging location of the accepted clip.
    pub source: PathBuf,
    /// Destination inside the threat's directory.
    pub dest: PathBuf,
    /// Files dropped from the evidence set; delete after the move.
    pub evicted: Vec<PathBuf>,
    /// Retained evidence file names, best first.
    pub retained: Vec<String>,
    /// Aggregate threat score, monotonic non-decreasing.
    pub score: u8,
    /// Explanation of the highest-scoring retained clip.
    pub explanation: String,
    /// Metadata of the highest-scoring retained clip.
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Default)]
struct ThreatState {
    active: bool,
    id: Option<ThreatId>,
    aggregate_score: u8,
    evidence: Vec<ClipCandidate>,
}

struct StateInner {
    prev_centroids: HashMap<usize, Centroid>,
    recording: bool,
    frames_recorded: usize,
    buffer: Vec<Frame>,
    last_capture: Option<Instant>,
    threat: ThreatState,
}

/// Lock-protected pipeline state with named atomic operations.
pub struct SharedState {
    inner: Mutex<StateInner>,
    cooldown: Duration,
    clip_frames: usize,
}

impl SharedState {
    pub fn new(cooldown: Duration, clip_frames: usize) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                prev_centroids: HashMap::new(),
                recording: false,
                frames_recorded: 0,
                buffer: Vec::new(),
                last_capture: None,
                threat: ThreatState::default(),
            }),
            cooldown,
            clip_frames,
        }
    }

    /// Swap in this frame's centroids and return each subject's displacement
    /// against the previous frame. Subjects absent from either frame carry
    /// no displacement; identity does not survive a gap.
    pub fn track(&self, centroids: HashMap<usize, Centroid>) -> Vec<f64> {
        let mut inner = self.inner.lock().unwrap();
        let moved = displacements(&inner.prev_centroids, &centroids);
        inner.prev_centroids = centroids;
        moved
    }

    /// Try to transition idle -> recording.
    ///
    /// Succeeds only when not already recording and the cooldown since the
    /// last attempt has elapsed. On success the buffer and counter reset and
    /// the attempt timestamp is stamped; the stamp sticks even if the clip
    /// is later discarded.
    pub fn try_start_recording(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.recording {
            return false;
        }
        if let Some(last) = inner.last_capture {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }

        inner.recording = true;
        inner.frames_recorded = 0;
        inner.buffer = Vec::new();
        inner.last_capture = Some(now);
        true
    }

    /// Append a frame while recording; returns the full buffer once the
    /// target frame count is reached, at which point the machine is idle
    /// again. Returns None while idle or mid-capture.
    pub fn record_frame(&self, frame: Frame) -> Option<Vec<Frame>> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.recording {
            return None;
        }

        inner.buffer.push(frame);
        inner.frames_recorded += 1;

        if inner.frames_recorded < self.clip_frames {
            return None;
        }

        inner.recording = false;
        inner.frames_recorded = 0;
        Some(std::mem::take(&mut inner.buffer))
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().unwrap().recording
    }

    /// Fold an accepted candidate into the current threat's evidence set.
    ///
    /// Opens a new threat when none is active. The candidate's path is
    /// rewritten to its destination under `media_root/<threat-id>/` before
    /// insertion; the evidence list is re-sorted descending by score and
    /// truncated to MAX_EVIDENCE_CLIPS from the tail. The sort is stable,
    /// so among tied scores the latest insertion is evicted first.
    pub fn fold_candidate(&self, candidate: ClipCandidate, media_root: &Path) -> LedgerPlan {
        let mut inner = self.inner.lock().unwrap();
        let threat = &mut inner.threat;

        let created = if threat.active {
            false
        } else {
            threat.active = true;
            threat.id = Some(ThreatId::new());
            threat.aggregate_score = 0;
            threat.evidence.clear();
            true
        };

        let threat_id = threat
            .id
            .clone()
            .expect("active threat always has an id");

        let file_name = candidate
            .file_name()
            .unwrap_or_else(|| "clip.mp4".to_string());
        let source = candidate.path.clone();
        let dest = media_root.join(threat_id.as_str()).join(&file_name);

        let mut accepted = candidate;
        accepted.path = dest.clone();

        threat.aggregate_score = threat.aggregate_score.max(accepted.score);
        threat.evidence.push(accepted);
        threat.evidence.sort_by(|a, b| b.score.cmp(&a.score));

        let mut evicted = Vec::new();
        while threat.evidence.len() > MAX_EVIDENCE_CLIPS {
            let lowest = threat.evidence.pop().expect("evidence not empty");
            evicted.push(lowest.path);
        }

        let best = &threat.evidence[0];

        LedgerPlan {
            threat_id,
            created,
            source,
            dest,
            evicted,
            retained: threat
                .evidence
                .iter()
                .filter_map(|clip| clip.file_name())
                .collect(),
            score: threat.aggregate_score,
            explanation: best.explanation.clone(),
            metadata: best.metadata.clone(),
        }
    }
}
