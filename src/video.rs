use std::borrow::{Borrow, Cow};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;
use std::thread;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::{ffmpeg_is_installed, FfmpegCommand};
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::VideoError;
use crate::generate::{Frame, FrameIter, GenerateConfig};

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// ffmpeg video codec; `mpeg4` is what the `mp4v` fourcc maps to
    pub codec: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            codec: String::from("mpeg4"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frames: usize,
    pub frame_rate: u32,
    pub width: usize,
    pub height: usize,
}

/// Makes sure an ffmpeg binary is reachable, optionally fetching one.
pub fn ensure_ffmpeg(download: bool) -> Result<(), VideoError> {
    if ffmpeg_is_installed() {
        return Ok(());
    }
    if !download {
        return Err(VideoError::FfmpegMissing);
    }
    info!("ffmpeg not found, downloading a static build");
    ffmpeg_sidecar::download::auto_download().map_err(|e| VideoError::Encoder {
        path: PathBuf::new(),
        message: format!("ffmpeg download failed: {e}"),
    })
}

/// Renders `config` and writes it to `path`.
#[instrument(skip(config, options), fields(pattern = %config.pattern, style = %config.style))]
pub fn write_video(
    config: &GenerateConfig,
    path: &Path,
    options: &EncodeOptions,
) -> Result<EncodedVideo, VideoError> {
    let frames = FrameIter::new(*config)?;
    if frames.len() == 0 {
        return Err(VideoError::EmptyVideo);
    }
    let size = (config.canvas.height as usize, config.canvas.width as usize);
    encode_frames(frames, size, config.frame_rate, path, options)
}

/// Writes already rendered frames to `path`.
pub fn encode(
    frames: &[Frame],
    frame_rate: u32,
    path: &Path,
    options: &EncodeOptions,
) -> Result<EncodedVideo, VideoError> {
    let first = frames.first().ok_or(VideoError::EmptyVideo)?;
    let size = (first.height(), first.width());
    if let Some(bad) = frames.iter().find(|f| (f.height(), f.width()) != size) {
        return Err(VideoError::FrameSizeMismatch {
            index: bad.index,
            expected: size,
            got: (bad.height(), bad.width()),
        });
    }
    if frame_rate == 0 {
        return Err(crate::error::ConfigError::InvalidFrameRate.into());
    }
    encode_frames(frames, size, frame_rate, path, options)
}

fn encode_frames<I>(
    frames: I,
    size: (usize, usize),
    frame_rate: u32,
    path: &Path,
    options: &EncodeOptions,
) -> Result<EncodedVideo, VideoError>
where
    I: IntoIterator,
    I::Item: Borrow<Frame>,
    I::IntoIter: Send,
{
    if !ffmpeg_is_installed() {
        return Err(VideoError::FfmpegMissing);
    }
    let io_err = |source: io::Error| VideoError::Io {
        path: path.to_path_buf(),
        source,
    };
    let encoder_err = |message: String| VideoError::Encoder {
        path: path.to_path_buf(),
        message,
    };

    let partial = partial_path(path)
        .ok_or_else(|| encoder_err(String::from("output path has no file name")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let (height, width) = size;
    let mut child = create_ffmpeg_command(width, height, frame_rate, &partial, options)
        .map_err(|e| encoder_err(format!("failed to start ffmpeg: {e}")))?;
    let guard = OutputGuard::new(partial, path);
    let stdin = child
        .take_stdin()
        .ok_or_else(|| encoder_err(String::from("ffmpeg stdin unavailable")))?;
    let events = child.iter().map_err(|e| encoder_err(e.to_string()))?;

    let frames = frames.into_iter();
    let mut ffmpeg_errors = Vec::new();
    let written = thread::scope(|s| {
        let writer = s.spawn(move || write_frames(stdin, frames, size));
        for event in events {
            match event {
                FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, msg)
                | FfmpegEvent::Error(msg) => {
                    error!("ffmpeg: {}", msg);
                    ffmpeg_errors.push(msg);
                }
                FfmpegEvent::Log(LogLevel::Warning, msg) => warn!("ffmpeg: {}", msg),
                _ => {}
            }
        }
        writer.join()
    });

    let status = child.wait().map_err(io_err)?;
    if !status.success() {
        let message = if ffmpeg_errors.is_empty() {
            format!("exited with {status}")
        } else {
            ffmpeg_errors.join("; ")
        };
        return Err(encoder_err(message));
    }
    let written = written
        .map_err(|_| encoder_err(String::from("frame writer panicked")))?
        .map_err(|e| match e {
            FrameWriteError::Io(source) => io_err(source),
            FrameWriteError::Size { index, got } => VideoError::FrameSizeMismatch {
                index,
                expected: size,
                got,
            },
        })?;

    guard.commit().map_err(io_err)?;
    debug!("Wrote {} frames to {}", written, path.display());
    Ok(EncodedVideo {
        path: path.to_path_buf(),
        frames: written,
        frame_rate,
        width,
        height,
    })
}

fn create_ffmpeg_command(
    width: usize,
    height: usize,
    frame_rate: u32,
    path: &Path,
    options: &EncodeOptions,
) -> io::Result<FfmpegChild> {
    FfmpegCommand::new()
        .hide_banner()
        .overwrite()
        .format("rawvideo")
        .pix_fmt("rgb24")
        .size(width as u32, height as u32)
        .rate(frame_rate as f32)
        .input("-")
        .codec_video(&options.codec)
        .pix_fmt("yuv420p")
        .output(path)
        .spawn()
}

enum FrameWriteError {
    Io(io::Error),
    Size { index: usize, got: (usize, usize) },
}

fn write_frames<I>(
    mut stdin: ChildStdin,
    frames: I,
    size: (usize, usize),
) -> Result<usize, FrameWriteError>
where
    I: Iterator,
    I::Item: Borrow<Frame>,
{
    let mut written = 0;
    for frame in frames {
        let frame = frame.borrow();
        let got = (frame.height(), frame.width());
        if got != size {
            return Err(FrameWriteError::Size {
                index: frame.index,
                got,
            });
        }
        stdin
            .write_all(&frame_bytes(frame))
            .map_err(FrameWriteError::Io)?;
        written += 1;
    }
    stdin.flush().map_err(FrameWriteError::Io)?;
    // dropping stdin closes the pipe so ffmpeg can finish the container
    Ok(written)
}

fn frame_bytes(frame: &Frame) -> Cow<'_, [u8]> {
    match frame.data.as_slice() {
        Some(bytes) => Cow::Borrowed(bytes),
        None => Cow::Owned(frame.data.iter().copied().collect()),
    }
}

/// Hidden sibling of `dest` that ffmpeg writes into. The extension is kept
/// so ffmpeg picks the same container.
fn partial_path(dest: &Path) -> Option<PathBuf> {
    let name = dest.file_name()?;
    let mut partial = OsString::from(".partial-");
    partial.push(name);
    Some(dest.with_file_name(partial))
}

/// Owns the partial file of an encode. `commit` moves it over the
/// destination; otherwise it is removed on drop, and whatever was at the
/// destination before is left alone.
struct OutputGuard<'a> {
    partial: PathBuf,
    dest: &'a Path,
    committed: bool,
}

impl<'a> OutputGuard<'a> {
    fn new(partial: PathBuf, dest: &'a Path) -> Self {
        Self {
            partial,
            dest,
            committed: false,
        }
    }

    fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.partial, self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let partial = self.partial.display();
        match fs::remove_file(&self.partial) {
            Ok(()) => warn!("Removed incomplete output {}", partial),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!("Failed to remove incomplete output {}: {}", partial, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::render::{Canvas, Style};
    use ffmpeg_sidecar::event::OutputVideoFrame;
    use ndarray::Array3;

    fn blank(index: usize, height: usize, width: usize) -> Frame {
        Frame {
            index,
            timestamp: 0.0,
            data: Array3::zeros((height, width, 3)),
        }
    }

    fn decode_frames(path: &Path) -> Vec<OutputVideoFrame> {
        let mut frames = vec![];
        FfmpegCommand::new()
            .input(path)
            .rawvideo()
            .spawn()
            .unwrap()
            .iter()
            .unwrap()
            .for_each(|e| match e {
                FfmpegEvent::Log(LogLevel::Error, e) => println!("Error: {}", e),
                FfmpegEvent::OutputFrame(f) => frames.push(f),
                _ => {}
            });
        frames
    }

    fn rgb_at(frame: &OutputVideoFrame, x: usize, y: usize) -> &[u8] {
        let i = (y * frame.width as usize + x) * 3;
        &frame.data[i..i + 3]
    }

    #[test]
    fn partial_path_is_a_hidden_sibling() {
        let partial = partial_path(Path::new("content/1_input.mov")).unwrap();
        assert_eq!(partial, PathBuf::from("content/.partial-1_input.mov"));
        assert_eq!(partial.extension().unwrap(), "mov");
        assert!(partial_path(Path::new("/")).is_none());
    }

    #[test]
    fn guard_removes_uncommitted_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1_input.mov");
        let partial = partial_path(&dest).unwrap();
        fs::write(&partial, b"half a container").unwrap();
        drop(OutputGuard::new(partial.clone(), &dest));
        assert!(!partial.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn guard_leaves_an_earlier_output_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1_input.mov");
        fs::write(&dest, b"previous run").unwrap();
        let partial = partial_path(&dest).unwrap();
        fs::write(&partial, b"half a container").unwrap();
        drop(OutputGuard::new(partial.clone(), &dest));
        assert!(!partial.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"previous run");
    }

    #[test]
    fn commit_moves_partial_over_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("done.mov");
        fs::write(&dest, b"old").unwrap();
        let partial = partial_path(&dest).unwrap();
        fs::write(&partial, b"new").unwrap();
        OutputGuard::new(partial.clone(), &dest).commit().unwrap();
        assert!(!partial.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn guard_tolerates_missing_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("never-created.mov");
        drop(OutputGuard::new(partial_path(&dest).unwrap(), &dest));
    }

    #[test]
    fn empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mov");
        let err = encode(&[], 30, &path, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, VideoError::EmptyVideo));
        assert!(!path.exists());
    }

    #[test]
    fn zero_duration_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mov");
        let config = GenerateConfig::new(Pattern::Line, Style::Plain, 0.0, 30);
        let err = write_video(&config, &path, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, VideoError::EmptyVideo));
    }

    #[test]
    fn invalid_config_is_rejected_before_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mov");
        let config = GenerateConfig::new(Pattern::Line, Style::Plain, 1.0, 0);
        let err = write_video(&config, &path, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, VideoError::Config(_)));
        assert!(!path.exists());
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.mov");
        let frames = vec![blank(0, 480, 640), blank(1, 240, 320)];
        let err = encode(&frames, 30, &path, &EncodeOptions::default()).unwrap_err();
        match err {
            VideoError::FrameSizeMismatch {
                index,
                expected,
                got,
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, (480, 640));
                assert_eq!(got, (240, 320));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_contiguous_frames_are_copied_in_row_order() {
        let mut data = Array3::<u8>::zeros((2, 2, 3));
        data[[0, 1, 0]] = 7;
        let frame = Frame {
            index: 0,
            timestamp: 0.0,
            data: data.clone(),
        };
        assert_eq!(frame_bytes(&frame)[3], 7);

        let flipped = Frame {
            index: 0,
            timestamp: 0.0,
            data: data.slice_move(ndarray::s![.., ..;-1, ..]),
        };
        assert_eq!(frame_bytes(&flipped)[0], 7);
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn encoded_video_decodes_to_the_same_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("2_input.mov");
        let config = GenerateConfig::new(Pattern::Circle, Style::Plain, 2.0, 30);
        let video = write_video(&config, &path, &EncodeOptions::default()).unwrap();
        assert_eq!(video.frames, 60);
        assert!(!partial_path(&path).unwrap().exists());

        let decoded = decode_frames(&path);
        assert_eq!(decoded.len(), 60);
        assert!(decoded.iter().all(|f| (f.width, f.height) == (640, 480)));
        // background stays white and the first dancer sits at (420, 240)
        assert!(rgb_at(&decoded[0], 5, 5).iter().all(|&c| c > 220));
        assert!(rgb_at(&decoded[0], 420, 240).iter().all(|&c| c < 40));
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mov");
        let options = EncodeOptions {
            codec: String::from("definitely-not-a-codec"),
        };
        let frames = vec![blank(0, 16, 16)];
        let err = encode(&frames, 30, &path, &options).unwrap_err();
        assert!(matches!(err, VideoError::Encoder { .. }));
        assert!(!path.exists());
        assert!(!partial_path(&path).unwrap().exists());
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn failed_encode_keeps_an_earlier_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_output.mov");
        fs::write(&path, b"previous run").unwrap();
        let options = EncodeOptions {
            codec: String::from("definitely-not-a-codec"),
        };
        let frames = vec![blank(0, 16, 16)];
        assert!(encode(&frames, 30, &path, &options).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"previous run");
    }
}
