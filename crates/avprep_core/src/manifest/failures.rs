//! Failure manifest: one line per unusable clip.
//!
//! `failed.<rank>.tsv` lines are `id<TAB>kind<TAB>message`.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ManifestError;
use crate::output::write_lines_atomic;

/// Why a clip produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No frame of the clip contained a face.
    NoFaceDetected,
    /// The detector kept failing after all retries.
    DetectionFailed,
    /// The first frame could not be aligned.
    AlignmentUnavailable,
    /// Decoding, encoding or probing failed.
    MediaError,
    /// A cached landmark file was unreadable or inconsistent.
    LandmarkError,
    /// Filesystem error while writing outputs.
    IoError,
    /// Outputs expected by a recount are missing.
    MissingOutput,
}

impl FailureKind {
    pub const ALL: [FailureKind; 7] = [
        FailureKind::NoFaceDetected,
        FailureKind::DetectionFailed,
        FailureKind::AlignmentUnavailable,
        FailureKind::MediaError,
        FailureKind::LandmarkError,
        FailureKind::IoError,
        FailureKind::MissingOutput,
    ];

    /// Name written to the failure manifest.
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::NoFaceDetected => "no_face_detected",
            FailureKind::DetectionFailed => "detection_failed",
            FailureKind::AlignmentUnavailable => "alignment_unavailable",
            FailureKind::MediaError => "media_error",
            FailureKind::LandmarkError => "landmark_error",
            FailureKind::IoError => "io_error",
            FailureKind::MissingOutput => "missing_output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == s.trim())
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One failed clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub clip_id: String,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureRecord {
    pub fn new(clip_id: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            clip_id: clip_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Encode as a manifest line; tabs and newlines in the message become
    /// spaces.
    pub fn to_line(&self) -> String {
        let message: String = self
            .message
            .chars()
            .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!("{}\t{}\t{}", self.clip_id, self.kind, message)
    }

    pub fn from_line(line: &str) -> Option<Self> {
        let mut cols = line.splitn(3, '\t');
        let clip_id = cols.next()?.to_string();
        let kind = FailureKind::parse(cols.next()?)?;
        let message = cols.next().unwrap_or_default().to_string();
        Some(Self {
            clip_id,
            kind,
            message,
        })
    }
}

/// Write failures atomically, in the given order.
pub fn write_failures(path: &Path, failures: &[FailureRecord]) -> Result<(), ManifestError> {
    write_lines_atomic(path, failures.iter().map(FailureRecord::to_line))
        .map_err(|e| ManifestError::io(path, e))
}

/// Read a failure manifest.
pub fn read_failures(path: &Path) -> Result<Vec<FailureRecord>, ManifestError> {
    let content = fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            FailureRecord::from_line(l).ok_or_else(|| ManifestError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                message: "expected 'id<TAB>kind<TAB>message'".to_string(),
            })
        })
        .collect()
}
