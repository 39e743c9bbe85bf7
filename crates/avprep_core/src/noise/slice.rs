//! Fixed-length slicing of long noise recordings.

use std::path::Path;

use super::{list_sources, relative_id, NoiseError, Rejected};
use crate::config::NoiseSettings;
use crate::media::{wav, MediaError};
use crate::models::{NoiseCategory, NoiseClip};
use crate::output::AtomicOutput;
use crate::shard::ShardSpec;

/// Outcome of slicing one shard of sources.
#[derive(Debug, Clone, Default)]
pub struct SliceReport {
    /// Source files this shard owned.
    pub sources: usize,
    /// Slices written by this run.
    pub written: usize,
    /// Slices that already existed and were kept.
    pub existing: usize,
    /// Every slice of the owned sources, in order.
    pub clips: Vec<NoiseClip>,
    pub rejected: Vec<Rejected>,
}

/// Slice the shard's share of `source_dir` into `out_dir`.
///
/// Sources are all WAV files under `source_dir`, sorted, leaving out
/// `out_dir` when it lies inside `source_dir`. Each is cut into
/// non-overlapping `slice_secs` windows; a shorter tail is dropped. Slice
/// `i` of `<dir>/<name>.wav` becomes `<out_dir>/<dir>/<name>-<i>.wav`.
/// Existing slices are kept as they are.
pub fn slice_sources(
    source_dir: &Path,
    out_dir: &Path,
    corpus: &str,
    category: NoiseCategory,
    spec: &ShardSpec,
    settings: &NoiseSettings,
) -> Result<SliceReport, NoiseError> {
    let all_sources = list_sources(source_dir, out_dir)?;
    let sources = spec.select(&all_sources);
    let window = (settings.slice_secs * settings.sample_rate as f64).round() as usize;

    tracing::info!(
        "[Noise] Slicing {} of {} sources ({} samples per slice) for shard {}",
        sources.len(),
        all_sources.len(),
        window,
        spec
    );

    let mut report = SliceReport {
        sources: sources.len(),
        ..SliceReport::default()
    };

    for source in sources {
        let samples = match wav::read_mono(source, Some(settings.sample_rate)) {
            Ok(samples) => samples,
            Err(e @ (MediaError::InvalidData { .. } | MediaError::Wav { .. })) => {
                tracing::warn!("[Noise] Skipping {}: {}", source.display(), e);
                report.rejected.push(Rejected {
                    path: source.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let base = relative_id(source_dir, source);
        for (i, chunk) in samples.chunks_exact(window.max(1)).enumerate() {
            let id = format!("{}-{}", base, i);
            let path = out_dir.join(format!("{}.wav", id));
            if path.is_file() {
                report.existing += 1;
            } else {
                write_slice(&path, chunk, settings.sample_rate)?;
                report.written += 1;
            }
            report.clips.push(NoiseClip {
                corpus: corpus.to_string(),
                id,
                path,
                num_samples: chunk.len() as u64,
                sample_rate: settings.sample_rate,
                category,
                sources: Vec::new(),
            });
        }
    }

    tracing::info!(
        "[Noise] Shard {}: {} slices written, {} already present, {} sources rejected",
        spec,
        report.written,
        report.existing,
        report.rejected.len()
    );
    Ok(report)
}

fn write_slice(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), NoiseError> {
    let io_err = |source| NoiseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let out = AtomicOutput::new(path).map_err(io_err)?;
    wav::write_mono(out.path(), samples, sample_rate)?;
    out.promote().map_err(io_err)?;
    Ok(())
}
