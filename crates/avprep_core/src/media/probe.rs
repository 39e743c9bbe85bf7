//! Video property detection.
//!
//! Uses ffprobe to read resolution, frame rate and duration, and to count
//! decoded frames of finished outputs.

use std::path::Path;
use std::process::Command;

use super::error::{MediaError, MediaResult};

/// Properties of a video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Frame rate as `(num, den)`.
    pub fps_fraction: (u32, u32),
    /// Duration in seconds (0 if unknown).
    pub duration_secs: f64,
    /// Frame count from the container, or estimated from duration.
    pub frame_count: u64,
}

impl VideoInfo {
    /// Bytes in one packed RGB24 frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Parse an ffprobe rate like `30000/1001` or `25`.
pub fn parse_fps_fraction(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    let (num, den) = match s.split_once('/') {
        Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
        None => (s.parse().ok()?, 1),
    };
    if num == 0 || den == 0 {
        return None;
    }
    Some((num, den))
}

/// Read a numeric field that ffprobe reports as a string ("N/A" if unknown).
fn string_number<T: std::str::FromStr>(value: Option<&serde_json::Value>) -> Option<T> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| *s != "N/A")
        .and_then(|s| s.parse().ok())
}

fn run_ffprobe(ffprobe: &Path, args: &[&str], path: &Path) -> MediaResult<serde_json::Value> {
    if !path.exists() {
        return Err(MediaError::SourceNotFound(path.to_path_buf()));
    }

    let output = Command::new(ffprobe)
        .args(args)
        .arg(path)
        .output()
        .map_err(|source| MediaError::Spawn {
            tool: ffprobe.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::ToolFailed {
            tool: "ffprobe".to_string(),
            path: path.to_path_buf(),
            message: stderr.lines().last().unwrap_or("unknown error").to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| MediaError::Probe {
        path: path.to_path_buf(),
        message: format!("Failed to parse ffprobe JSON: {}", e),
    })
}

/// Detect the properties of the first video stream of `path`.
pub fn probe_video(ffprobe: &Path, path: &Path) -> MediaResult<VideoInfo> {
    let data = run_ffprobe(
        ffprobe,
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,duration",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ],
        path,
    )?;

    let stream = data
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|s| s.first())
        .ok_or_else(|| MediaError::Probe {
            path: path.to_path_buf(),
            message: "no video stream".to_string(),
        })?;

    let dimension = |key: &str| -> MediaResult<u32> {
        stream
            .get(key)
            .and_then(|v| v.as_u64())
            .filter(|&v| v > 0)
            .map(|v| v as u32)
            .ok_or_else(|| MediaError::Probe {
                path: path.to_path_buf(),
                message: format!("missing stream {}", key),
            })
    };
    let width = dimension("width")?;
    let height = dimension("height")?;

    let fps_fraction = stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .and_then(parse_fps_fraction)
        .ok_or_else(|| MediaError::Probe {
            path: path.to_path_buf(),
            message: "missing or invalid r_frame_rate".to_string(),
        })?;
    let fps = fps_fraction.0 as f64 / fps_fraction.1 as f64;

    // MKV and some MP4 muxers only report the format duration
    let duration_secs = string_number::<f64>(stream.get("duration"))
        .or_else(|| string_number(data.get("format").and_then(|f| f.get("duration"))))
        .unwrap_or(0.0);

    let frame_count = string_number::<u64>(stream.get("nb_frames"))
        .unwrap_or_else(|| (duration_secs * fps).round() as u64);

    tracing::debug!(
        "[Probe] {}: {}x{} @ {:.3} fps, {:.2}s, ~{} frames",
        path.display(),
        width,
        height,
        fps,
        duration_secs,
        frame_count
    );

    Ok(VideoInfo {
        width,
        height,
        fps,
        fps_fraction,
        duration_secs,
        frame_count,
    })
}

/// Count decoded video frames with `ffprobe -count_frames`.
///
/// Slower than reading container metadata but exact.
pub fn count_video_frames(ffprobe: &Path, path: &Path) -> MediaResult<u64> {
    let data = run_ffprobe(
        ffprobe,
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_frames",
            "-show_entries",
            "stream=nb_read_frames",
            "-of",
            "json",
        ],
        path,
    )?;

    let stream = data
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|s| s.first());

    string_number(stream.and_then(|s| s.get("nb_read_frames"))).ok_or_else(|| MediaError::Probe {
        path: path.to_path_buf(),
        message: "ffprobe did not report nb_read_frames".to_string(),
    })
}
