//! Noise corpus construction.
//!
//! - [`slice`]: cut long recordings into fixed-length clips
//! - [`babble`]: mix random speech clips into babble noise
//! - [`manifest`]: per-category and combined TSV manifests
//!
//! All stages read 16-bit mono WAV at the configured sample rate; other
//! files are reported and skipped. Source files are never modified.

pub mod babble;
pub mod manifest;
pub mod slice;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use babble::{build_babble, BabbleReport, BABBLE_SOURCES};
pub use manifest::{build_manifests, ManifestReport, ALL_MANIFEST};
pub use slice::{slice_sources, SliceReport};

use crate::media::{wav, MediaError};
use crate::output::is_partial;

/// Noise corpus errors.
#[derive(Debug, thiserror::Error)]
pub enum NoiseError {
    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Babble needs {needed} distinct speech clips, only {available} usable")]
    NotEnoughSources { needed: usize, available: usize },

    #[error("Output directory '{0}' is the source directory")]
    OutputIsSource(PathBuf),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// A source file that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub path: PathBuf,
    pub reason: String,
}

/// All `.wav` files under `dir`, recursively, sorted by path.
pub fn list_wavs(dir: &Path) -> Result<Vec<PathBuf>, NoiseError> {
    let mut found = Vec::new();
    collect_wavs(dir, None, &mut found)?;
    found.sort();
    Ok(found)
}

/// Source WAVs under `source_dir` for a stage writing into `out_dir`.
///
/// An `out_dir` nested inside `source_dir` is not scanned, so earlier
/// outputs never join the source list. Writing into `source_dir` itself is
/// rejected.
pub fn list_sources(source_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, NoiseError> {
    let root = fs::canonicalize(source_dir).map_err(|source| NoiseError::Scan {
        path: source_dir.to_path_buf(),
        source,
    })?;
    // A missing output directory holds nothing to skip
    let skip = fs::canonicalize(out_dir).ok();
    if skip.as_deref() == Some(root.as_path()) {
        return Err(NoiseError::OutputIsSource(out_dir.to_path_buf()));
    }

    let mut found = Vec::new();
    collect_wavs(source_dir, skip.as_deref(), &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_wavs(
    dir: &Path,
    skip: Option<&Path>,
    found: &mut Vec<PathBuf>,
) -> Result<(), NoiseError> {
    let scan_err = |source| NoiseError::Scan {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        if path.is_dir() {
            let skipped = skip.is_some_and(|skip| {
                fs::canonicalize(&path).is_ok_and(|p| p.as_path() == skip)
            });
            if skipped {
                tracing::debug!("[Noise] Not scanning output directory {}", path.display());
                continue;
            }
            collect_wavs(&path, skip, found)?;
        } else if !is_partial(&path)
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Path of `path` relative to `root` without extension, using `/`.
pub fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path).with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check that a WAV file is mono at `sample_rate`; returns its length.
pub fn check_wav(path: &Path, sample_rate: u32) -> Result<u64, String> {
    let info = wav::wav_info(path).map_err(|e| e.to_string())?;
    if info.channels != 1 {
        return Err(format!("expected mono, found {} channels", info.channels));
    }
    if info.sample_rate != sample_rate {
        return Err(format!(
            "expected {} Hz, found {} Hz",
            sample_rate, info.sample_rate
        ));
    }
    Ok(info.num_frames)
}
