//! FFmpeg CLI wrapper for clip assembly and frame capture.
//!
//! This crate provides:
//! - A builder/runner pair for FFmpeg invocations
//! - The clip assembler (raw-frame intermediate, H.264 transcode)
//! - A raw-video frame source reading frames off an FFmpeg pipe
//! - Cross-device-safe file moves for the staging-to-threat hand-off

pub mod assembler;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod source;

pub use assembler::ClipAssembler;
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use source::VideoSource;
