use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::error::{ConfigError, VideoError};
use crate::generate::GenerateConfig;
use crate::pattern::Pattern;
use crate::render::{Canvas, Style};
use crate::video::{write_video, EncodeOptions};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read fixture config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("file extension must be a plain, non-empty name, got `{0}`")]
    InvalidExtension(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// A directory of paired input/output videos, one pair per pattern.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureSuite {
    pub output_dir: PathBuf,
    pub extension: String,
    pub duration_seconds: f64,
    pub frame_rate: u32,
    pub canvas: Canvas,
    pub patterns: Vec<Pattern>,
}

impl Default for FixtureSuite {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("content"),
            extension: String::from("mov"),
            duration_seconds: 2.0,
            frame_rate: 30,
            canvas: Canvas::default(),
            patterns: Pattern::ALL.to_vec(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub index: usize,
    pub pattern: Pattern,
    pub style: Style,
    pub file: String,
    pub frames: usize,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

/// One video the suite will write.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureJob {
    pub index: usize,
    pub config: GenerateConfig,
    pub file: String,
}

/// `{index}_input.{ext}` for plain videos, `{index}_output.{ext}` for
/// formation videos.
pub fn fixture_file_name(index: usize, style: Style, extension: &str) -> String {
    let role = match style {
        Style::Plain => "input",
        Style::Formation => "output",
    };
    format!("{index}_{role}.{extension}")
}

impl FixtureSuite {
    pub fn from_file(path: &Path) -> Result<Self, SuiteError> {
        let text = fs::read_to_string(path).map_err(|source| SuiteError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SuiteError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), SuiteError> {
        let ext = &self.extension;
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(SuiteError::InvalidExtension(ext.clone()));
        }
        for job in self.jobs() {
            job.config.validate()?;
            if job.config.frame_count() == 0 {
                return Err(VideoError::EmptyVideo.into());
            }
        }
        Ok(())
    }

    /// Videos in write order: for each pattern, its input then its output.
    pub fn jobs(&self) -> Vec<FixtureJob> {
        self.patterns
            .iter()
            .enumerate()
            .flat_map(|(n, &pattern)| {
                let index = n + 1;
                [Style::Plain, Style::Formation].map(|style| FixtureJob {
                    index,
                    config: GenerateConfig {
                        pattern,
                        style,
                        duration_seconds: self.duration_seconds,
                        frame_rate: self.frame_rate,
                        canvas: self.canvas,
                    },
                    file: fixture_file_name(index, style, &self.extension),
                })
            })
            .collect()
    }
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

#[instrument(skip_all, fields(output_dir = %suite.output_dir.display()))]
pub fn run(
    suite: &FixtureSuite,
    options: &EncodeOptions,
) -> Result<Vec<ManifestEntry>, SuiteError> {
    suite.validate()?;
    let jobs = suite.jobs();

    fs::create_dir_all(&suite.output_dir).map_err(|source| SuiteError::Io {
        path: suite.output_dir.clone(),
        source,
    })?;

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut manifest = Vec::with_capacity(jobs.len());
    for job in jobs {
        pb.set_message(job.file.clone());
        let path = suite.output_dir.join(&job.file);
        let video = write_video(&job.config, &path, options)?;
        info!("Created {}", path.display());
        manifest.push(ManifestEntry {
            index: job.index,
            pattern: job.config.pattern,
            style: job.config.style,
            file: job.file,
            frames: video.frames,
            frame_rate: video.frame_rate,
            width: job.config.canvas.width,
            height: job.config.canvas.height,
        });
        pb.inc(1);
    }
    pb.finish_and_clear();

    write_manifest(&suite.output_dir, &manifest)?;
    info!("Test videos created successfully");
    Ok(manifest)
}

pub fn write_manifest(dir: &Path, entries: &[ManifestEntry]) -> Result<PathBuf, SuiteError> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(&path, json).map_err(|source| SuiteError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
