//! Clip records: one entry of the corpus manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Time window inside a source recording, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBoundary {
    /// Start offset in seconds.
    pub start_secs: f64,
    /// End offset in seconds (`None` runs to the end of the source).
    pub end_secs: Option<f64>,
}

impl TimeBoundary {
    /// Create a new boundary.
    pub fn new(start_secs: f64, end_secs: Option<f64>) -> Self {
        Self {
            start_secs: start_secs.max(0.0),
            end_secs,
        }
    }

    /// Duration of the window, if it has an end.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_secs.map(|end| (end - self.start_secs).max(0.0))
    }

    /// Whether the boundary covers the whole source.
    pub fn is_unbounded(&self) -> bool {
        self.start_secs <= 0.0 && self.end_secs.is_none()
    }
}

/// Where a clip's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSource {
    /// Extract the audio stream of the clip's video.
    FromVideo,
    /// A separate audio recording.
    File(PathBuf),
}

/// A single clip of the corpus.
///
/// Created once while reading the manifest and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    /// Clip identifier; also the relative output name (may contain `/`).
    pub id: String,
    /// Source video path.
    pub video_path: PathBuf,
    /// Audio source.
    pub audio: AudioSource,
    /// Transcript text, if known.
    #[serde(default)]
    pub transcript: Option<String>,
    /// Optional trim window inside the source.
    #[serde(default)]
    pub bounds: Option<TimeBoundary>,
}

impl ClipRecord {
    /// Create a clip whose audio is derived from its video.
    pub fn new(id: impl Into<String>, video_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            video_path: video_path.into(),
            audio: AudioSource::FromVideo,
            transcript: None,
            bounds: None,
        }
    }

    /// Use a separate audio file.
    pub fn with_audio_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio = AudioSource::File(path.into());
        self
    }

    /// Set the transcript.
    pub fn with_transcript(mut self, text: impl Into<String>) -> Self {
        self.transcript = Some(text.into());
        self
    }

    /// Set the trim window.
    pub fn with_bounds(mut self, bounds: TimeBoundary) -> Self {
        self.bounds = if bounds.is_unbounded() {
            None
        } else {
            Some(bounds)
        };
        self
    }

    /// Path the audio is read from.
    pub fn audio_input(&self) -> &Path {
        match &self.audio {
            AudioSource::FromVideo => &self.video_path,
            AudioSource::File(path) => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_input_defaults_to_video() {
        let clip = ClipRecord::new("spk1/00001", "/data/spk1/00001.mp4");
        assert_eq!(clip.audio_input(), Path::new("/data/spk1/00001.mp4"));

        let clip = clip.with_audio_file("/data/spk1/00001.wav");
        assert_eq!(clip.audio_input(), Path::new("/data/spk1/00001.wav"));
    }

    #[test]
    fn unbounded_window_is_dropped() {
        let clip = ClipRecord::new("a", "a.mp4").with_bounds(TimeBoundary::new(0.0, None));
        assert!(clip.bounds.is_none());

        let clip = ClipRecord::new("a", "a.mp4").with_bounds(TimeBoundary::new(1.5, Some(4.0)));
        assert_eq!(clip.bounds.and_then(|b| b.duration_secs()), Some(2.5));
    }
}
