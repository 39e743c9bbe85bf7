//! Manifest files read and written by workers.
//!
//! - [`clips`]: the input clip manifest
//! - [`failures`]: per-shard failure manifest
//! - [`lists`]: per-shard clip id and label lists

pub mod clips;
pub mod failures;
pub mod lists;

use std::path::PathBuf;

pub use clips::{read_clip_manifest, ClipManifest};
pub use failures::{read_failures, write_failures, FailureKind, FailureRecord};
pub use lists::{write_shard_lists, FILE_LIST, LABEL_LIST};

/// Manifest read/write errors.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to access manifest '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest line {line} in '{path}': {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Duplicate clip id '{id}' at line {line}")]
    DuplicateId { id: String, line: usize },
}

impl ManifestError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
