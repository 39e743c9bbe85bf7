//! Clip manifest parsing.
//!
//! Tab separated, one clip per line:
//!
//! ```text
//! id  video  audio|-  [transcript|-]
//! id  video  audio|-  transcript|-  start|-  end|-
//! ```
//!
//! `#` starts a comment line and blank lines are ignored. An audio column
//! of `-` derives the audio from the video. A time window is two trailing
//! numeric columns after the transcript; an end of `-` or `-1` runs to the
//! end of the source. If the first line has a single column it names the
//! root directory that relative paths are resolved against.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::ManifestError;
use crate::models::{ClipRecord, TimeBoundary};

/// Parsed clip manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipManifest {
    /// Root directory for relative paths, if the manifest declares one.
    pub root: Option<PathBuf>,
    /// Clips in file order.
    pub clips: Vec<ClipRecord>,
}

impl ClipManifest {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn resolve(root: Option<&Path>, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path,
    }
}

fn parse_time(value: &str, name: &str) -> Result<Option<f64>, String> {
    match value {
        "" | "-" => Ok(None),
        s => {
            let t: f64 = s
                .parse()
                .map_err(|_| format!("invalid {} time '{}'", name, s))?;
            if !t.is_finite() {
                return Err(format!("invalid {} time '{}'", name, s));
            }
            Ok(Some(t))
        }
    }
}

/// Raw `(start, end)` columns; `None` for `-`.
type TimeColumns = (Option<f64>, Option<f64>);

/// Split a trailing `start end` pair off the columns after `audio`.
///
/// The pair only counts when a transcript column precedes it and both
/// values are times, so a lone transcript is never read as a bound.
fn split_bounds<'a>(rest: &'a [&'a str]) -> (&'a [&'a str], Option<TimeColumns>) {
    if rest.len() < 3 {
        return (rest, None);
    }
    let (text, tail) = rest.split_at(rest.len() - 2);
    match (parse_time(tail[0], "start"), parse_time(tail[1], "end")) {
        (Ok(start), Ok(end)) => (text, Some((start, end))),
        _ => (rest, None),
    }
}

/// Parse one clip line.
fn parse_clip_line(line: &str, root: Option<&Path>) -> Result<ClipRecord, String> {
    let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
    let id = cols[0];
    let video = cols.get(1).copied().unwrap_or_default();
    if id.is_empty() || video.is_empty() {
        return Err("expected at least 'id<TAB>video'".to_string());
    }

    let mut clip = ClipRecord::new(id, resolve(root, video));
    match cols.get(2).copied() {
        None | Some("") | Some("-") => {}
        Some(audio) => clip = clip.with_audio_file(resolve(root, audio)),
    }

    let (text, bounds) = split_bounds(cols.get(3..).unwrap_or_default());
    if let Some((start, end)) = bounds {
        let start = start.unwrap_or(0.0);
        if start < 0.0 {
            return Err(format!("negative start time {}", start));
        }
        let end = match end {
            Some(end) if end == -1.0 => None,
            Some(end) if end <= start => {
                return Err(format!("end {} is not after start {}", end, start));
            }
            other => other,
        };
        clip = clip.with_bounds(TimeBoundary::new(start, end));
    }

    let transcript = text.join("\t");
    if !transcript.is_empty() && transcript != "-" {
        clip = clip.with_transcript(transcript);
    }
    Ok(clip)
}

/// Parse manifest text. `path` is only used in error messages.
pub fn parse_clip_manifest(content: &str, path: &Path) -> Result<ClipManifest, ManifestError> {
    let mut manifest = ClipManifest::default();
    let mut seen = HashSet::new();
    let mut first_content_line = true;

    for (i, raw) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if first_content_line {
            first_content_line = false;
            if !line.contains('\t') {
                manifest.root = Some(PathBuf::from(line.trim()));
                continue;
            }
        }

        let clip =
            parse_clip_line(line, manifest.root.as_deref()).map_err(|message| ManifestError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message,
            })?;
        if !seen.insert(clip.id.clone()) {
            return Err(ManifestError::DuplicateId {
                id: clip.id,
                line: line_no,
            });
        }
        manifest.clips.push(clip);
    }

    Ok(manifest)
}

/// Read and parse a clip manifest file.
pub fn read_clip_manifest(path: &Path) -> Result<ClipManifest, ManifestError> {
    let content = fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
    let manifest = parse_clip_manifest(&content, path)?;
    tracing::debug!(
        "[Manifest] Read {} clips from {}",
        manifest.len(),
        path.display()
    );
    Ok(manifest)
}
