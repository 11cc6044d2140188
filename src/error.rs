use std::path::PathBuf;

use thiserror::Error;

/// Rejected parameters. Always raised before any frame is produced.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown pattern `{0}` (expected one of: line, circle, v_shape)")]
    UnknownPattern(String),

    #[error("unknown style `{0}` (expected one of: plain, formation)")]
    UnknownStyle(String),

    #[error("duration must be a finite, non-negative number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("frame rate must be greater than 0")]
    InvalidFrameRate,

    #[error("canvas must have non-zero, even dimensions, got {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("refusing to encode a video with no frames")]
    EmptyVideo,

    #[error("frame {index} is {got:?} but the video is {expected:?} (height, width)")]
    FrameSizeMismatch {
        index: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("ffmpeg binary not found; install it or pass --download-ffmpeg")]
    FfmpegMissing,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg failed for {path}: {message}")]
    Encoder { path: PathBuf, message: String },
}
