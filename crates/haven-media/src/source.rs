//! Raw-video frame source backed by an FFmpeg pipe.
//!
//! FFmpeg decodes the input (file, RTSP url, device) and emits packed RGB24
//! frames on stdout, scaled to the capture size. Failure to open the source
//! is the pipeline's only fatal condition.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, warn};

use haven_models::Frame;

use crate::error::{MediaError, MediaResult};

/// Sequential frame reader over an FFmpeg rawvideo pipe.
pub struct VideoSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frame_len: usize,
    next_index: u64,
}

impl VideoSource {
    /// Spawn FFmpeg against `input` and start reading frames at the capture
    /// size and rate.
    pub fn open(input: &str, width: u32, height: u32, fps: u32) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut child = Command::new("ffmpeg")
            .args([
                "-v",
                "error",
                "-i",
                input,
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-vf",
                &format!("scale={}:{}", width, height),
                "-r",
                &fps.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::SourceClosed("stdout not captured".to_string()))?;

        info!("Opened video source '{}' at {}x{} @ {} fps", input, width, height, fps);

        Ok(Self {
            child,
            stdout,
            width,
            height,
            frame_len: Frame::expected_len(width, height),
            next_index: 0,
        })
    }

    /// Read the next frame. `Ok(None)` signals end of stream.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let mut data = vec![0u8; self.frame_len];

        match self.stdout.read_exact(&mut data).await {
            Ok(_) => {
                let frame = Frame {
                    index: self.next_index,
                    width: self.width,
                    height: self.height,
                    data,
                };
                self.next_index += 1;
                Ok(Some(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Stream drained; a torn trailing frame is dropped
                info!("Video source ended after {} frames", self.next_index);
                Ok(None)
            }
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Number of frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    /// Stop the decoder process.
    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop video decoder: {}", e);
        }
    }
}
