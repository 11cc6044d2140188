use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, instrument};

use formation_fixtures::fixtures::{self, FixtureSuite};
use formation_fixtures::video::{ensure_ffmpeg, write_video, EncodeOptions};
use formation_fixtures::{Canvas, GenerateConfig, Pattern, Style};

mod log;

use crate::log::init_logger;

/// Synthesizes dancer formation videos for test fixtures
#[derive(Parser, Debug)]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// log level
    #[arg(long, global = true, default_value_t = String::from("info"))]
    log_level: String,

    /// log file
    #[arg(long, global = true, default_value_t = String::from("formation-fixtures.log"))]
    log_file: String,

    /// download a static ffmpeg build if none is installed
    #[arg(long, global = true)]
    download_ffmpeg: bool,

    /// ffmpeg video codec
    #[arg(long, global = true, default_value_t = String::from("mpeg4"))]
    codec: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single video
    Generate(GenerateArgs),

    /// Write the paired input/output videos for every pattern
    Fixtures(FixturesArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// formation to draw
    #[arg(short, long, value_enum)]
    pattern: Pattern,

    /// plain dancers or the labeled formation view
    #[arg(short, long, value_enum, default_value_t = Style::Plain)]
    style: Style,

    /// length of the video in seconds
    #[arg(short, long, default_value_t = 3.0)]
    duration: f64,

    /// frames per second
    #[arg(short, long, default_value_t = 30)]
    fps: u32,

    /// frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// destination file; the extension picks the container
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct FixturesArgs {
    /// TOML file describing the suite
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// directory to write the videos into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// container extension, e.g. mov or mp4
    #[arg(short, long)]
    extension: Option<String>,

    /// length of each video in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// frames per second
    #[arg(short, long)]
    fps: Option<u32>,
}

impl FixturesArgs {
    fn into_suite(self) -> Result<FixtureSuite> {
        let mut suite = match &self.config {
            Some(path) => FixtureSuite::from_file(path)?,
            None => FixtureSuite::default(),
        };
        if let Some(dir) = self.output_dir {
            suite.output_dir = dir;
        }
        if let Some(ext) = self.extension {
            suite.extension = ext;
        }
        if let Some(duration) = self.duration {
            suite.duration_seconds = duration;
        }
        if let Some(fps) = self.fps {
            suite.frame_rate = fps;
        }
        Ok(suite)
    }
}

#[instrument(skip_all)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let guard = init_logger(cli.log_level, cli.log_file)?;
    let start = Instant::now();
    let options = EncodeOptions { codec: cli.codec };

    match cli.command {
        Command::Generate(args) => {
            let config = GenerateConfig {
                pattern: args.pattern,
                style: args.style,
                duration_seconds: args.duration,
                frame_rate: args.fps,
                canvas: Canvas {
                    width: args.width,
                    height: args.height,
                },
            };
            config.validate()?;
            ensure_ffmpeg(cli.download_ffmpeg)?;
            let video = write_video(&config, &args.output, &options)
                .with_context(|| format!("failed to create {}", args.output.display()))?;
            info!("Created {} ({} frames)", video.path.display(), video.frames);
        }
        Command::Fixtures(args) => {
            let suite = args.into_suite()?;
            suite.validate()?;
            ensure_ffmpeg(cli.download_ffmpeg)?;
            let manifest = fixtures::run(&suite, &options)?;
            info!(
                "Wrote {} videos to {}",
                manifest.len(),
                suite.output_dir.display()
            );
        }
    }

    info!("Time elapsed: {:?}", start.elapsed());
    drop(guard);
    Ok(())
}
