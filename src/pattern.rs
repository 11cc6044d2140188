use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Formation the dancers are arranged in.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[value(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Horizontal line bobbing up and down
    Line,

    /// Ring rotating around the frame center
    Circle,

    /// Static V with the apex above the arms
    VShape,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [Pattern::Line, Pattern::Circle, Pattern::VShape];

    pub fn name(self) -> &'static str {
        match self {
            Pattern::Line => "line",
            Pattern::Circle => "circle",
            Pattern::VShape => "v_shape",
        }
    }

    pub fn marker_count(self) -> usize {
        match self {
            Pattern::Line => 5,
            Pattern::Circle => 6,
            Pattern::VShape => 7,
        }
    }

    /// Position of marker `i` at `t` seconds into the video.
    ///
    /// Fractional coordinates are truncated toward zero.
    pub fn position(self, t: f64, i: usize) -> (i32, i32) {
        match self {
            Pattern::Line => {
                let x = 100.0 + i as f64 * 110.0;
                let y = 240.0 + 20.0 * (t * 2.0).sin();
                (x as i32, y as i32)
            }
            Pattern::Circle => {
                let angle = i as f64 * 2.0 * PI / 6.0 + t;
                let x = 320.0 + 100.0 * angle.cos();
                let y = 240.0 + 100.0 * angle.sin();
                (x as i32, y as i32)
            }
            Pattern::VShape => {
                // markers 0..4 form the left arm, the rest the right arm
                let (k, side) = if i < 4 {
                    (i as i32 + 1, -1)
                } else {
                    (i as i32 - 3, 1)
                };
                (320 + side * k * 60, 200 + k * 40)
            }
        }
    }

    pub fn positions(self, t: f64) -> Vec<(i32, i32)> {
        (0..self.marker_count())
            .map(|i| self.position(t, i))
            .collect()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPattern(s.to_string()))
    }
}
