//! Landmark files and temporal post-processing.
//!
//! - [`file`]: text encoding of per-frame landmarks and the reference face
//! - [`smooth`]: gap filling and moving-average smoothing

pub mod file;
pub mod smooth;

use std::path::PathBuf;

pub use file::{read_landmarks, read_reference, write_landmarks};
pub use smooth::{fill_and_smooth, interpolate_missing, moving_average};

/// Errors reading or writing landmark files.
#[derive(Debug, thiserror::Error)]
pub enum LandmarkError {
    #[error("Failed to access landmark file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid landmark line {line} in '{path}': {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Landmark line {line} in '{path}' has {found} keypoints, expected {expected}")]
    KeypointCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Landmark file '{0}' contains no usable keypoints")]
    Empty(PathBuf),

    #[error("Cannot smooth a sequence with no detected frames")]
    NothingToSmooth,
}
