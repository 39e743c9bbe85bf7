//! Error types for shard runs.
//!
//! Two levels:
//! - [`ShardError`] aborts the worker (bad configuration, unwritable output)
//! - [`ClipError`] fails one clip; it ends up in the failure manifest and the
//!   shard carries on

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::align::AlignError;
use crate::counter::CountError;
use crate::detect::DetectError;
use crate::landmarks::LandmarkError;
use crate::manifest::{FailureKind, ManifestError};
use crate::media::MediaError;
use crate::shard::PartitionError;

/// Fatal worker error.
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Reference face unusable: {0}")]
    Reference(#[from] AlignError),

    #[error("Failed to open shard log: {0}")]
    Logger(#[source] io::Error),

    #[error("Failed to start worker threads: {0}")]
    ThreadPool(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write shard counts: {0}")]
    Count(#[from] CountError),
}

impl ShardError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single clip.
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("no face detected in any frame")]
    NoFace,

    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error("{0}")]
    Align(#[from] AlignError),

    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("{0}")]
    Landmark(#[from] LandmarkError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    #[error("Output validation failed: {0}")]
    InvalidOutput(String),
}

impl ClipError {
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Failure manifest category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoFace | Self::Landmark(LandmarkError::NothingToSmooth) => {
                FailureKind::NoFaceDetected
            }
            Self::Detect(DetectError::Media(_)) => FailureKind::MediaError,
            Self::Detect(_) => FailureKind::DetectionFailed,
            Self::Align(AlignError::Media(_) | AlignError::FrameCountMismatch { .. }) => {
                FailureKind::MediaError
            }
            Self::Align(_) => FailureKind::AlignmentUnavailable,
            Self::Media(_) => FailureKind::MediaError,
            Self::Landmark(_) => FailureKind::LandmarkError,
            Self::Io { .. } => FailureKind::IoError,
            Self::InvalidInput(_) => FailureKind::MediaError,
            Self::InvalidOutput(_) => FailureKind::MissingOutput,
        }
    }
}

/// Result type for clip steps.
pub type ClipResult<T> = Result<T, ClipError>;

/// Result type for shard runs.
pub type ShardResult<T> = Result<T, ShardError>;
