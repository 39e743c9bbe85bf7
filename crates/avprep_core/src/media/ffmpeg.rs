//! FFmpeg subprocess backend.
//!
//! Frames are streamed as packed RGB24 through pipes: one long-lived decoder
//! per opened clip and one encoder per output, so memory use does not grow
//! with clip length.

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;

use super::error::{MediaError, MediaResult};
use super::probe::{self, VideoInfo};
use super::{FrameSink, FrameSource, MediaBackend};
use crate::config::MediaSettings;
use crate::models::TimeBoundary;

/// Media backend driving the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    video_codec: String,
    crf: u8,
    preset: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::from_settings(&MediaSettings::default())
    }
}

impl FfmpegBackend {
    /// Create a backend from the `[media]` settings.
    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self {
            ffmpeg: PathBuf::from(&settings.ffmpeg_path),
            ffprobe: PathBuf::from(&settings.ffprobe_path),
            video_codec: settings.video_codec.clone(),
            crf: settings.video_crf,
            preset: settings.video_preset.clone(),
        }
    }

    fn spawn(&self, cmd: &mut Command) -> MediaResult<Child> {
        tracing::trace!("[FFmpeg] Running {:?}", cmd);
        cmd.spawn().map_err(|source| MediaError::Spawn {
            tool: self.ffmpeg.display().to_string(),
            source,
        })
    }
}

/// `-ss` goes before `-i` (input seeking), `-t` after it.
fn input_args(cmd: &mut Command, input: &Path, bounds: Option<&TimeBoundary>) {
    if let Some(b) = bounds.filter(|b| b.start_secs > 0.0) {
        cmd.arg("-ss").arg(format!("{:.3}", b.start_secs));
    }
    cmd.arg("-i").arg(input);
    if let Some(duration) = bounds.and_then(TimeBoundary::duration_secs) {
        cmd.arg("-t").arg(format!("{:.3}", duration));
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    /// Check if the configured ffmpeg and ffprobe run.
    fn is_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|tool| {
            Command::new(tool)
                .arg("-version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
    }

    fn open_video(
        &self,
        path: &Path,
        bounds: Option<&TimeBoundary>,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let mut info = probe::probe_video(&self.ffprobe, path)?;
        if let Some(b) = bounds {
            let remaining = (info.duration_secs - b.start_secs).max(0.0);
            let duration = b.duration_secs().map_or(remaining, |d| d.min(remaining));
            info.duration_secs = duration;
            info.frame_count = (duration * info.fps).round() as u64;
        }

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-nostdin", "-v", "error"]);
        input_args(&mut cmd, path, bounds);
        cmd.args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = self.spawn(&mut cmd)?;
        let stdout = child.stdout.take().ok_or_else(|| MediaError::ToolFailed {
            tool: "ffmpeg".to_string(),
            path: path.to_path_buf(),
            message: "failed to capture stdout".to_string(),
        })?;

        tracing::debug!(
            "[FFmpeg] Decoding {} ({}x{} @ {:.3} fps)",
            path.display(),
            info.width,
            info.height,
            info.fps
        );

        Ok(Box::new(FfmpegFrameSource {
            path: path.to_path_buf(),
            buffer: vec![0; info.frame_bytes()],
            info,
            child,
            stdout: BufReader::new(stdout),
            finished: false,
        }))
    }

    fn create_video(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps_fraction: (u32, u32),
    ) -> MediaResult<Box<dyn FrameSink>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-nostdin", "-y", "-v", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{}/{}", fps_fraction.0, fps_fraction.1))
            .args(["-i", "pipe:0", "-an"])
            .arg("-c:v")
            .arg(&self.video_codec)
            .arg("-crf")
            .arg(self.crf.to_string())
            .arg("-preset")
            .arg(&self.preset)
            .args(["-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = self.spawn(&mut cmd)?;
        let stdin = child.stdin.take();

        Ok(Box::new(FfmpegFrameSink {
            path: path.to_path_buf(),
            child,
            stdin,
            width,
            height,
            written: 0,
            finished: false,
        }))
    }

    fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        bounds: Option<&TimeBoundary>,
        sample_rate: u32,
    ) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::SourceNotFound(input.to_path_buf()));
        }

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-nostdin", "-y", "-v", "error"]);
        input_args(&mut cmd, input, bounds);
        cmd.args(["-vn", "-ac", "1"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .args(["-c:a", "pcm_s16le", "-f", "wav"])
            .arg(output);

        tracing::trace!("[FFmpeg] Running {:?}", cmd);
        let result = cmd.output().map_err(|source| MediaError::Spawn {
            tool: self.ffmpeg.display().to_string(),
            source,
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                path: input.to_path_buf(),
                message: stderr.lines().last().unwrap_or("unknown error").to_string(),
            });
        }
        Ok(())
    }

    fn count_video_frames(&self, path: &Path) -> MediaResult<u64> {
        probe::count_video_frames(&self.ffprobe, path)
    }
}

/// Streaming decoder over an ffmpeg rawvideo pipe.
struct FfmpegFrameSource {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FfmpegFrameSource {
    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                path: self.path.clone(),
                message: format!("decoder exited with code: {:?}", status.code()),
            });
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let filled = read_full(&mut self.stdout, &mut self.buffer)?;
        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < self.buffer.len() {
            self.finished = true;
            let _ = self.child.kill();
            let _ = self.child.wait();
            return Err(MediaError::InvalidData {
                path: self.path.clone(),
                message: format!(
                    "short frame: {} of {} bytes",
                    filled,
                    self.buffer.len()
                ),
            });
        }

        let data = std::mem::replace(&mut self.buffer, vec![0; self.info.frame_bytes()]);
        let frame = RgbImage::from_raw(self.info.width, self.info.height, data).ok_or_else(|| {
            MediaError::InvalidData {
                path: self.path.clone(),
                message: "frame buffer does not match dimensions".to_string(),
            }
        })?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Streaming encoder fed through ffmpeg's stdin.
struct FfmpegFrameSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    written: u64,
    finished: bool,
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::InvalidData {
                path: self.path.clone(),
                message: format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            });
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| MediaError::ToolFailed {
            tool: "ffmpeg".to_string(),
            path: self.path.clone(),
            message: "encoder stdin is closed".to_string(),
        })?;
        stdin.write_all(frame.as_raw())?;
        self.written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> MediaResult<u64> {
        // Closing stdin signals end of stream
        drop(self.stdin.take());
        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                path: self.path.clone(),
                message: format!("encoder exited with code: {:?}", status.code()),
            });
        }
        Ok(self.written)
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
