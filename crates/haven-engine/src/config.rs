//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Video input: file path, RTSP url, or device
    pub video_source: String,
    /// Capture width in pixels
    pub capture_width: u32,
    /// Capture height in pixels
    pub capture_height: u32,
    /// Centroid displacement (pixels/frame) that flags a subject as fighting
    pub speed_threshold: f64,
    /// Minimum interval between capture attempts
    pub capture_cooldown: Duration,
    /// Clip length in seconds
    pub clip_duration_secs: u32,
    /// Clip frame rate
    pub clip_fps: u32,
    /// Scores at or below this are discarded
    pub score_threshold: u8,
    /// Silence duration before an active threat is closed
    pub inactivity_window: Duration,
    /// Cleanup sweeper polling interval
    pub cleanup_poll_interval: Duration,
    /// Alert geofence radius in miles
    pub alert_radius_miles: f64,
    /// Root directory for threat evidence and the staging area
    pub media_root: PathBuf,
    /// Bounded depth of the clip work queue
    pub clip_queue_depth: usize,
    /// Number of clip workers
    pub clip_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            video_source: String::new(),
            capture_width: 640,
            capture_height: 360,
            speed_threshold: 15.0,
            capture_cooldown: Duration::from_secs(10),
            clip_duration_secs: 5,
            clip_fps: 15,
            score_threshold: 6,
            inactivity_window: Duration::from_secs(5),
            cleanup_poll_interval: Duration::from_secs(5),
            alert_radius_miles: 5.0,
            media_root: PathBuf::from("captures"),
            clip_queue_depth: 8,
            clip_workers: 2,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    ///
    /// `VIDEO_SOURCE` is required; everything else has a default.
    pub fn from_env() -> EngineResult<Self> {
        let defaults = Self::default();

        let video_source = std::env::var("VIDEO_SOURCE")
            .map_err(|_| EngineError::config_error("VIDEO_SOURCE not set"))?;

        Ok(Self {
            video_source,
            capture_width: env_parse("CAPTURE_WIDTH", defaults.capture_width),
            capture_height: env_parse("CAPTURE_HEIGHT", defaults.capture_height),
            speed_threshold: env_parse("SPEED_THRESHOLD", defaults.speed_threshold),
            capture_cooldown: Duration::from_secs(env_parse(
                "CAPTURE_COOLDOWN_SECS",
                defaults.capture_cooldown.as_secs(),
            )),
            clip_duration_secs: env_parse("CLIP_DURATION_SECS", defaults.clip_duration_secs),
            clip_fps: env_parse("CLIP_FPS", defaults.clip_fps),
            score_threshold: env_parse("SCORE_THRESHOLD", defaults.score_threshold),
            inactivity_window: Duration::from_secs(env_parse(
                "INACTIVITY_WINDOW_SECS",
                defaults.inactivity_window.as_secs(),
            )),
            cleanup_poll_interval: Duration::from_secs(env_parse(
                "CLEANUP_POLL_INTERVAL_SECS",
                defaults.cleanup_poll_interval.as_secs(),
            )),
            alert_radius_miles: env_parse("ALERT_RADIUS_MILES", defaults.alert_radius_miles),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            clip_queue_depth: env_parse("CLIP_QUEUE_DEPTH", defaults.clip_queue_depth),
            clip_workers: env_parse("CLIP_WORKERS", defaults.clip_workers),
        })
    }

    /// Frames per clip: duration times rate.
    pub fn clip_frames(&self) -> usize {
        (self.clip_duration_secs * self.clip_fps) as usize
    }

    /// Staging directory for clips not yet attributed to a threat.
    pub fn staging_dir(&self) -> PathBuf {
        self.media_root.join("staging")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
