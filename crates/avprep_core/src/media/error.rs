//! Media error types.

use std::path::PathBuf;

/// Errors from decoding, encoding or probing media.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Input file does not exist.
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    /// External tool could not be started.
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited with an error.
    #[error("{tool} failed on '{path}': {message}")]
    ToolFailed {
        tool: String,
        path: PathBuf,
        message: String,
    },

    /// Probe output could not be interpreted.
    #[error("Failed to probe '{path}': {message}")]
    Probe { path: PathBuf, message: String },

    /// Decoded data is inconsistent (short frame, wrong format...).
    #[error("Invalid media data in '{path}': {message}")]
    InvalidData { path: PathBuf, message: String },

    /// I/O error while streaming.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV read/write error.
    #[error("WAV error in '{path}': {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

impl MediaError {
    pub(crate) fn wav(path: &std::path::Path, source: hound::Error) -> Self {
        Self::Wav {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;
