use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ConfigError;
use crate::pattern::Pattern;
use crate::render::{markers, render_frame, Canvas, Style};

/// One rendered frame. `data` is laid out as (height, width, rgb).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub timestamp: f64,
    pub data: Array3<u8>,
}

impl Frame {
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GenerateConfig {
    pub pattern: Pattern,
    pub style: Style,
    pub duration_seconds: f64,
    pub frame_rate: u32,
    pub canvas: Canvas,
}

impl GenerateConfig {
    pub fn new(pattern: Pattern, style: Style, duration_seconds: f64, frame_rate: u32) -> Self {
        Self {
            pattern,
            style,
            duration_seconds,
            frame_rate,
            canvas: Canvas::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(ConfigError::InvalidDuration(self.duration_seconds));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        self.canvas.validate()
    }

    pub fn frame_count(&self) -> usize {
        frame_count(self.duration_seconds, self.frame_rate)
    }
}

/// Number of frames in a video: `duration * fps`, truncated.
pub fn frame_count(duration_seconds: f64, frame_rate: u32) -> usize {
    (duration_seconds * frame_rate as f64) as usize
}

/// Lazily renders the frames of a validated config, in order.
pub struct FrameIter {
    config: GenerateConfig,
    next: usize,
    total: usize,
}

impl FrameIter {
    pub fn new(config: GenerateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            next: 0,
            total: config.frame_count(),
        })
    }

    fn render(&self, index: usize) -> Frame {
        let GenerateConfig {
            pattern,
            style,
            frame_rate,
            canvas,
            ..
        } = self.config;
        let t = index as f64 / frame_rate as f64;
        let img = render_frame(canvas, style, &markers(pattern, style, t));
        let shape = (canvas.height as usize, canvas.width as usize, 3);
        // RgbImage is row major with interleaved channels, same as the array
        let data = Array3::from_shape_vec(shape, img.into_raw())
            .unwrap_or_else(|_| unreachable!("canvas and image dimensions agree"));
        Frame {
            index,
            timestamp: t,
            data,
        }
    }
}

impl Iterator for FrameIter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.next >= self.total {
            return None;
        }
        let frame = self.render(self.next);
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FrameIter {}

#[instrument(skip_all, fields(pattern = %config.pattern, style = %config.style))]
pub fn generate(config: &GenerateConfig) -> Result<Vec<Frame>, ConfigError> {
    let frames: Vec<Frame> = FrameIter::new(*config)?.collect();
    debug!("Generated {} frames", frames.len());
    Ok(frames)
}
