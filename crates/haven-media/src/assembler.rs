//! Clip assembly: buffered frames to a playable H.264 file.
//!
//! Frames are written to a raw-video intermediate first, then transcoded.
//! A failed transcode removes the intermediate and any partial output, so a
//! half-encoded clip is never exposed to the scoring gate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use haven_models::Frame;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Disambiguates clips assembled within the same millisecond.
static CLIP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Assembles buffered frames into finished clips in the staging directory.
#[derive(Debug, Clone)]
pub struct ClipAssembler {
    staging_dir: PathBuf,
    fps: u32,
    crf: u8,
    preset: String,
    transcode_timeout_secs: u64,
}

impl ClipAssembler {
    pub fn new(staging_dir: impl AsRef<Path>, fps: u32) -> Self {
        Self {
            staging_dir: staging_dir.as_ref().to_path_buf(),
            fps,
            crf: 23,
            preset: "fast".to_string(),
            transcode_timeout_secs: 120,
        }
    }

    /// Encode the buffered frames into an H.264 clip.
    ///
    /// Returns the path of the finished file in the staging directory. The
    /// caller owns the file from this point; the assembler keeps nothing.
    pub async fn assemble(&self, frames: &[Frame]) -> MediaResult<PathBuf> {
        let (width, height) = validate_frames(frames)?;

        fs::create_dir_all(&self.staging_dir).await?;

        let base = unique_clip_name(Utc::now().timestamp_millis());
        let raw_path = self.staging_dir.join(format!("{}.raw", base));
        let clip_path = self.staging_dir.join(format!("{}.mp4", base));

        self.write_raw(&raw_path, frames).await?;

        let cmd = FfmpegCommand::new(&raw_path, &clip_path)
            .input_format("rawvideo")
            .input_pixel_format("rgb24")
            .input_size(width, height)
            .input_rate(self.fps)
            .video_codec("libx264")
            .preset(&self.preset)
            .crf(self.crf)
            .output_pixel_format("yuv420p");

        let result = FfmpegRunner::new()
            .with_timeout(self.transcode_timeout_secs)
            .run(&cmd)
            .await;

        // Intermediate is never useful past this point
        if let Err(e) = fs::remove_file(&raw_path).await {
            warn!("Failed to remove raw intermediate {}: {}", raw_path.display(), e);
        }

        if let Err(e) = result {
            // Do not leave a partial clip behind
            let _ = fs::remove_file(&clip_path).await;
            return Err(e);
        }

        info!(
            "Clip assembled: {} ({} frames @ {} fps)",
            clip_path.display(),
            frames.len(),
            self.fps
        );
        Ok(clip_path)
    }

    async fn write_raw(&self, path: &Path, frames: &[Frame]) -> MediaResult<()> {
        let mut file = File::create(path).await?;
        for frame in frames {
            file.write_all(&frame.data).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Check the buffer is non-empty, complete, and uniform in dimensions.
fn validate_frames(frames: &[Frame]) -> MediaResult<(u32, u32)> {
    let first = frames
        .first()
        .ok_or_else(|| MediaError::invalid_frames("empty frame buffer"))?;

    for frame in frames {
        if frame.width != first.width || frame.height != first.height {
            return Err(MediaError::invalid_frames(format!(
                "mixed dimensions: {}x{} vs {}x{}",
                frame.width, frame.height, first.width, first.height
            )));
        }
        if !frame.is_complete() {
            return Err(MediaError::invalid_frames(format!(
                "frame {} has {} bytes, expected {}",
                frame.index,
                frame.data.len(),
                Frame::expected_len(frame.width, frame.height)
            )));
        }
    }

    Ok((first.width, first.height))
}

/// Millisecond timestamp plus a process-wide counter keeps names unique
/// across concurrent assemblies.
fn unique_clip_name(timestamp_ms: i64) -> String {
    let seq = CLIP_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("clip_{}_{}", timestamp_ms, seq)
}
