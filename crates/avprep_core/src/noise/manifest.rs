//! Per-category noise manifests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{check_wav, list_wavs, NoiseError, Rejected};
use crate::config::NoiseSettings;
use crate::models::NoiseCategory;
use crate::output::write_lines_atomic;

/// Name of the combined manifest.
pub const ALL_MANIFEST: &str = "all.tsv";

/// Result of a manifest build.
#[derive(Debug, Clone, Default)]
pub struct ManifestReport {
    /// Entries kept per category, as `(path, nframes)`.
    pub entries: BTreeMap<NoiseCategory, Vec<(PathBuf, u64)>>,
    /// Files outside the duration window.
    pub filtered: usize,
    pub rejected: Vec<Rejected>,
    /// Manifest files written, the combined one last.
    pub written: Vec<PathBuf>,
}

impl ManifestReport {
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

fn manifest_line(path: &Path, nframes: u64) -> String {
    format!("{}\t{}", path.display(), nframes)
}

/// Write `<out_dir>/<category>.tsv` for every category in `inputs` and a
/// combined `all.tsv`.
///
/// Each input directory is scanned recursively. Clips whose duration is
/// outside `[min_secs, max_secs)` are left out. Rows are `path\tnframes`
/// with absolute paths, sorted per category; `all.tsv` concatenates the
/// categories in [`NoiseCategory::ALL`] order.
pub fn build_manifests(
    inputs: &[(PathBuf, NoiseCategory)],
    out_dir: &Path,
    settings: &NoiseSettings,
) -> Result<ManifestReport, NoiseError> {
    let mut report = ManifestReport::default();
    let rate = settings.sample_rate as f64;

    for (dir, category) in inputs {
        let entries = report.entries.entry(*category).or_default();
        for path in list_wavs(dir)? {
            let nframes = match check_wav(&path, settings.sample_rate) {
                Ok(n) => n,
                Err(reason) => {
                    tracing::warn!("[Noise] Skipping {}: {}", path.display(), reason);
                    report.rejected.push(Rejected { path, reason });
                    continue;
                }
            };
            let secs = nframes as f64 / rate;
            if secs < settings.min_secs || secs >= settings.max_secs {
                report.filtered += 1;
                continue;
            }
            let path = std::path::absolute(&path).map_err(|source| NoiseError::Scan {
                path: path.clone(),
                source,
            })?;
            entries.push((path, nframes));
        }
    }

    let mut all = Vec::new();
    for (category, entries) in report.entries.iter_mut() {
        entries.sort();
        entries.dedup();
        let lines: Vec<String> = entries.iter().map(|(p, n)| manifest_line(p, *n)).collect();
        let path = out_dir.join(format!("{}.tsv", category.name()));
        write_lines_atomic(&path, &lines).map_err(|source| NoiseError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!("[Noise] {}: {} clips -> {}", category.name(), lines.len(), path.display());
        all.extend(lines);
        report.written.push(path);
    }

    let all_path = out_dir.join(ALL_MANIFEST);
    write_lines_atomic(&all_path, &all).map_err(|source| NoiseError::Io {
        path: all_path.clone(),
        source,
    })?;
    report.written.push(all_path);

    tracing::info!(
        "[Noise] Manifest: {} clips kept, {} outside [{}, {}) s, {} rejected",
        report.total(),
        report.filtered,
        settings.min_secs,
        settings.max_secs,
        report.rejected.len()
    );
    Ok(report)
}
