//! Landmark file encoding.
//!
//! One line per frame: `2*K` space-separated floats (`x0 y0 x1 y1 ...`), or
//! `-` for a frame without a face. The reference face file is a single line
//! in the same encoding.

use std::fs;
use std::path::Path;

use super::LandmarkError;
use crate::models::{Keypoints, LandmarkSequence};
use crate::output::write_lines_atomic;

/// Marker for a frame without a detected face.
pub const MISSING: &str = "-";

/// Encode one frame's landmarks.
pub fn format_line(frame: Option<&Keypoints>) -> String {
    match frame {
        None => MISSING.to_string(),
        Some(kp) => kp
            .to_flat()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Decode one line. `Ok(None)` is a missing frame.
pub fn parse_line(line: &str) -> Result<Option<Keypoints>, String> {
    let line = line.trim();
    if line == MISSING {
        return Ok(None);
    }
    let values = line
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| format!("not a number: '{}'", tok))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err("empty line".to_string());
    }
    let kp = Keypoints::from_flat(&values)
        .ok_or_else(|| format!("odd number of values ({})", values.len()))?;
    if !kp.is_finite() {
        return Err("non-finite coordinate".to_string());
    }
    Ok(Some(kp))
}

/// Write a landmark sequence atomically.
pub fn write_landmarks(path: &Path, seq: &LandmarkSequence) -> Result<(), LandmarkError> {
    let lines = seq.frames().iter().map(|f| format_line(f.as_ref()));
    write_lines_atomic(path, lines).map_err(|source| LandmarkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a landmark sequence.
///
/// With `expected_points`, every present frame must have that many keypoints.
pub fn read_landmarks(
    path: &Path,
    expected_points: Option<usize>,
) -> Result<LandmarkSequence, LandmarkError> {
    let content = fs::read_to_string(path).map_err(|source| LandmarkError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seq = LandmarkSequence::default();
    for (i, line) in content.lines().enumerate() {
        let frame = parse_line(line).map_err(|message| LandmarkError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            message,
        })?;
        if let (Some(kp), Some(expected)) = (&frame, expected_points) {
            if kp.len() != expected {
                return Err(LandmarkError::KeypointCount {
                    path: path.to_path_buf(),
                    line: i + 1,
                    expected,
                    found: kp.len(),
                });
            }
        }
        seq.push(frame);
    }
    Ok(seq)
}

/// Read the reference face: the first non-blank line of `path`.
pub fn read_reference(path: &Path, expected_points: usize) -> Result<Keypoints, LandmarkError> {
    let content = fs::read_to_string(path).map_err(|source| LandmarkError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (index, line) = content
        .lines()
        .enumerate()
        .find(|(_, l)| !l.trim().is_empty())
        .ok_or_else(|| LandmarkError::Empty(path.to_path_buf()))?;

    let kp = parse_line(line)
        .map_err(|message| LandmarkError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        })?
        .ok_or_else(|| LandmarkError::Empty(path.to_path_buf()))?;

    if kp.len() != expected_points {
        return Err(LandmarkError::KeypointCount {
            path: path.to_path_buf(),
            line: index + 1,
            expected: expected_points,
            found: kp.len(),
        });
    }
    Ok(kp)
}
