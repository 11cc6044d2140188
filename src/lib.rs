//! Synthetic dancer videos for test fixtures.
//!
//! Each [`Pattern`] places a fixed number of markers with a closed-form
//! formula of elapsed time, [`generate()`] renders them into frames, and
//! [`video`] pipes frames through ffmpeg into a container file.

pub mod error;
pub mod fixtures;
pub mod generate;
pub mod pattern;
pub mod render;
pub mod video;

pub use error::{ConfigError, VideoError};
pub use generate::{generate, Frame, FrameIter, GenerateConfig};
pub use pattern::Pattern;
pub use render::{Canvas, Style};
