//! The sequential frame loop.
//!
//! One frame is read, detected, and (while recording) buffered per
//! iteration. The loop never waits on assembly, scoring, or ledger I/O;
//! completed buffers go to the clip queue and the loop moves on. Losing the
//! video stream is the only fatal condition.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{info, warn};

use haven_media::VideoSource;
use haven_models::Frame;

use crate::detector::SubjectDetector;
use crate::error::EngineResult;
use crate::queue::{ClipJob, ClipQueue};
use crate::state::SharedState;
use crate::tracker::{person_centroids, triggered};

/// Drives frames from the source through detection, triggering, and capture.
pub struct FramePipeline<D> {
    state: Arc<SharedState>,
    detector: D,
    queue: ClipQueue,
    speed_threshold: f64,
    capture_metadata: Option<Map<String, Value>>,
}

impl<D: SubjectDetector> FramePipeline<D> {
    pub fn new(
        state: Arc<SharedState>,
        detector: D,
        queue: ClipQueue,
        speed_threshold: f64,
        capture_metadata: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            state,
            detector,
            queue,
            speed_threshold,
            capture_metadata,
        }
    }

    /// Consume the source until it ends. Source errors propagate; they end
    /// the process.
    pub async fn run(&self, source: &mut VideoSource) -> EngineResult<()> {
        info!("Frame pipeline started");

        while let Some(frame) = source.next_frame().await? {
            self.process_frame(frame).await;
        }

        info!("Video stream ended after {} frames", source.frames_read());
        Ok(())
    }

    /// Handle a single frame: detect, evaluate the trigger, buffer.
    pub(crate) async fn process_frame(&self, frame: Frame) {
        let detections = match self.detector.detect(&frame).await {
            Ok(detections) => detections,
            Err(e) => {
                // Detector hiccups skip the frame, nothing more
                warn!("Detector failed on frame {}: {}", frame.index, e);
                return;
            }
        };

        let centroids = person_centroids(&detections);
        let moved = self.state.track(centroids);

        if triggered(&moved, self.speed_threshold)
            && self.state.try_start_recording(Instant::now())
        {
            info!("Recording started at frame {}", frame.index);
        }

        if let Some(frames) = self.state.record_frame(frame) {
            info!("Recording finished, {} frames buffered", frames.len());
            self.queue.submit(ClipJob {
                frames,
                metadata: self.capture_metadata.clone(),
            });
        }
    }
}

/// Load the capture-location sidecar next to a file-based video source.
///
/// `foo.mp4` pairs with `foo_metadata.json`; a missing or unreadable sidecar
/// degrades to no metadata (and therefore no proximity alerts).
pub fn load_capture_metadata(video_source: &str) -> Option<Map<String, Value>> {
    let path = Path::new(video_source);
    let stem = path.file_stem()?.to_str()?;
    let sidecar = path.with_file_name(format!("{}_metadata.json", stem));

    let raw = match std::fs::read_to_string(&sidecar) {
        Ok(raw) => raw,
        Err(_) => return None,
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => {
            info!("Loaded capture metadata from {}", sidecar.display());
            Some(map)
        }
        Ok(_) => {
            warn!("Capture metadata {} is not a JSON object", sidecar.display());
            None
        }
        Err(e) => {
            warn!("Unparseable capture metadata {}: {}", sidecar.display(), e);
            None
        }
    }
}
