use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use clap::ValueEnum;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pattern::Pattern;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const FORMATION_BACKGROUND: Rgb<u8> = Rgb([44, 44, 44]);
pub const GRID_COLOR: Rgb<u8> = Rgb([68, 68, 68]);
pub const GRID_SPACING: u32 = 40;

/// Dancer colors for the formation view, picked by `marker index % len`.
pub const PALETTE: [Rgb<u8>; 6] = [
    Rgb([107, 107, 255]),
    Rgb([196, 205, 78]),
    Rgb([209, 183, 69]),
    Rgb([180, 206, 150]),
    Rgb([87, 202, 254]),
    Rgb([221, 160, 221]),
];

const BODY_RADIUS: i32 = 25;
const HEAD_RADIUS: i32 = 15;
const HEAD_OFFSET: i32 = 30;
const FORMATION_RADIUS: i32 = 20;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl Canvas {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |v: u32| v == 0 || v % 2 != 0;
        if bad(self.width) || bad(self.height) {
            return Err(ConfigError::InvalidCanvas {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Look of a rendered video
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[value(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Black dancers with heads on white, used for input videos
    Plain,

    /// Numbered colored markers over a grid, used for output videos
    Formation,
}

impl Style {
    pub fn name(self) -> &'static str {
        match self {
            Style::Plain => "plain",
            Style::Formation => "formation",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Style::Plain),
            "formation" => Ok(Style::Formation),
            other => Err(ConfigError::UnknownStyle(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub x: i32,
    pub y: i32,
    pub radius: i32,
    pub color: Rgb<u8>,
    pub label: Option<usize>,
}

pub fn markers(pattern: Pattern, style: Style, t: f64) -> Vec<Marker> {
    pattern
        .positions(t)
        .into_iter()
        .enumerate()
        .map(|(i, (x, y))| match style {
            Style::Plain => Marker {
                x,
                y,
                radius: BODY_RADIUS,
                color: BLACK,
                label: None,
            },
            Style::Formation => Marker {
                x,
                y,
                radius: FORMATION_RADIUS,
                color: PALETTE[i % PALETTE.len()],
                label: Some(i + 1),
            },
        })
        .collect()
}

pub fn render_frame(canvas: Canvas, style: Style, markers: &[Marker]) -> RgbImage {
    let background = match style {
        Style::Plain => WHITE,
        Style::Formation => FORMATION_BACKGROUND,
    };
    let mut img = RgbImage::from_pixel(canvas.width, canvas.height, background);

    if style == Style::Formation {
        draw_grid(&mut img);
    }

    for marker in markers {
        draw_filled_circle_mut(&mut img, (marker.x, marker.y), marker.radius, marker.color);
        if style == Style::Plain {
            draw_filled_circle_mut(
                &mut img,
                (marker.x, marker.y - HEAD_OFFSET),
                HEAD_RADIUS,
                marker.color,
            );
        }
        if let Some(label) = marker.label {
            let origin = (marker.x - 7, marker.y + 7);
            draw_label(&mut img, &label.to_string(), origin, WHITE);
        }
    }
    img
}

fn draw_grid(img: &mut RgbImage) {
    let (width, height) = img.dimensions();
    let (right, bottom) = ((width - 1) as f32, (height - 1) as f32);
    for x in (0..width).step_by(GRID_SPACING as usize) {
        let x = x as f32;
        draw_line_segment_mut(img, (x, 0.0), (x, bottom), GRID_COLOR);
    }
    for y in (0..height).step_by(GRID_SPACING as usize) {
        let y = y as f32;
        draw_line_segment_mut(img, (0.0, y), (right, y), GRID_COLOR);
    }
}

const LABEL_FONT_BYTES: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/DejaVuSans-Bold.ttf"
));

/// Line height of label text in pixels; digits come out about 13 px tall.
pub const LABEL_SCALE: f32 = 21.0;

fn label_font() -> &'static FontRef<'static> {
    static FONT: OnceLock<FontRef<'static>> = OnceLock::new();
    FONT.get_or_init(|| {
        FontRef::try_from_slice(LABEL_FONT_BYTES)
            .expect("bundled label font is valid TrueType")
    })
}

/// Draws `text` with the left end of its baseline at `origin`.
pub fn draw_label(img: &mut RgbImage, text: &str, origin: (i32, i32), color: Rgb<u8>) {
    let font = label_font();
    let scale = PxScale::from(LABEL_SCALE);
    // draw_text_mut takes the top of the line box, the baseline sits one ascent below it
    let ascent = font.as_scaled(scale).ascent().round() as i32;
    let (x, baseline) = origin;
    draw_text_mut(img, color, x, baseline - ascent, scale, font, text);
}
