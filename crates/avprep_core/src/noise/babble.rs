//! Babble synthesis from a pool of speech clips.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use super::{check_wav, list_sources, relative_id, NoiseError, Rejected};
use crate::config::NoiseSettings;
use crate::media::wav;
use crate::models::{NoiseCategory, NoiseClip};
use crate::output::{write_lines_atomic, AtomicOutput};
use crate::shard::ShardSpec;

/// Base name of the per-rank provenance file.
pub const BABBLE_SOURCES: &str = "babble.sources";

const SLOT_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Outcome of one babble shard.
#[derive(Debug, Clone, Default)]
pub struct BabbleReport {
    pub written: usize,
    pub existing: usize,
    /// Every clip of the shard's slots, in slot order.
    pub clips: Vec<NoiseClip>,
    pub rejected: Vec<Rejected>,
    /// Provenance file written for this shard.
    pub sources_file: PathBuf,
}

/// Seed for output slot `k`. Depends only on the base seed and the slot.
pub fn slot_seed(seed: u64, slot: usize) -> u64 {
    seed ^ (slot as u64).wrapping_mul(SLOT_MIX)
}

/// Indices into the speech pool mixed into slot `k`, in draw order.
pub fn pick_sources(seed: u64, slot: usize, pool: usize, mix: usize) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(slot_seed(seed, slot));
    index::sample(&mut rng, pool, mix).into_vec()
}

/// Average waveforms sample by sample; shorter inputs are zero padded.
pub fn mix_average(inputs: &[Vec<i16>]) -> Vec<i16> {
    let len = inputs.iter().map(Vec::len).max().unwrap_or(0);
    if inputs.is_empty() {
        return Vec::new();
    }
    let mut acc = vec![0f64; len];
    for input in inputs {
        for (sum, &sample) in acc.iter_mut().zip(input) {
            *sum += sample as f64;
        }
    }
    let n = inputs.len() as f64;
    acc.into_iter().map(|sum| (sum / n).round() as i16).collect()
}

/// Build the shard's share of `babble_count` babble clips.
///
/// The speech pool is every usable WAV under `speech_dir` (outside
/// `out_dir`), sorted. Slot `k`
/// is written to `<out_dir>/babble-<k>.wav` and its source ids are recorded
/// in `<out_dir>/babble.sources.<rank>`. Existing clips are kept.
pub fn build_babble(
    speech_dir: &Path,
    out_dir: &Path,
    spec: &ShardSpec,
    settings: &NoiseSettings,
) -> Result<BabbleReport, NoiseError> {
    let mut report = BabbleReport::default();
    let mut pool = Vec::new();
    for path in list_sources(speech_dir, out_dir)? {
        match check_wav(&path, settings.sample_rate) {
            Ok(_) => pool.push(path),
            Err(reason) => {
                tracing::warn!("[Noise] Skipping speech clip {}: {}", path.display(), reason);
                report.rejected.push(Rejected { path, reason });
            }
        }
    }

    if pool.len() < settings.babble_mix {
        return Err(NoiseError::NotEnoughSources {
            needed: settings.babble_mix,
            available: pool.len(),
        });
    }

    let slots = spec.range(settings.babble_count);
    tracing::info!(
        "[Noise] Babble slots {:?} of {} from {} speech clips (mix {}, seed {})",
        slots,
        settings.babble_count,
        pool.len(),
        settings.babble_mix,
        settings.seed
    );

    let mut provenance = Vec::with_capacity(slots.len());
    for slot in slots {
        let picks = pick_sources(settings.seed, slot, pool.len(), settings.babble_mix);
        let source_ids: Vec<String> = picks
            .iter()
            .map(|&i| relative_id(speech_dir, &pool[i]))
            .collect();

        let id = format!("babble-{:06}", slot);
        let path = out_dir.join(format!("{}.wav", id));

        let num_samples = if path.is_file() {
            report.existing += 1;
            wav::wav_info(&path)?.num_frames
        } else {
            let inputs = picks
                .iter()
                .map(|&i| wav::read_mono(&pool[i], Some(settings.sample_rate)))
                .collect::<Result<Vec<_>, _>>()?;
            let mixed = mix_average(&inputs);
            write_clip(&path, &mixed, settings.sample_rate)?;
            report.written += 1;
            mixed.len() as u64
        };

        provenance.push(format!("{}\t{}", id, source_ids.join(",")));
        report.clips.push(NoiseClip {
            corpus: "babble".to_string(),
            id,
            path,
            num_samples,
            sample_rate: settings.sample_rate,
            category: NoiseCategory::Babble,
            sources: source_ids,
        });
    }

    let sources_file = out_dir.join(spec.suffixed(BABBLE_SOURCES));
    write_lines_atomic(&sources_file, &provenance).map_err(|source| NoiseError::Io {
        path: sources_file.clone(),
        source,
    })?;
    report.sources_file = sources_file;

    tracing::info!(
        "[Noise] Shard {}: {} babble clips written, {} already present",
        spec,
        report.written,
        report.existing
    );
    Ok(report)
}

fn write_clip(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), NoiseError> {
    let io_err = |source| NoiseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let out = AtomicOutput::new(path).map_err(io_err)?;
    wav::write_mono(out.path(), samples, sample_rate)?;
    out.promote().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::write_constant;
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn settings(mix: usize, count: usize) -> NoiseSettings {
        NoiseSettings {
            sample_rate: 100,
            babble_mix: mix,
            babble_count: count,
            seed: 7,
            ..NoiseSettings::default()
        }
    }

    #[test]
    fn average_pads_and_never_clips() {
        let mixed = mix_average(&[vec![i16::MAX, i16::MAX], vec![i16::MAX]]);
        assert_eq!(mixed, vec![i16::MAX, 16384]);
        assert!(mix_average(&[]).is_empty());
    }

    #[test]
    fn picks_are_distinct_and_deterministic() {
        let a = pick_sources(3, 12, 50, 30);
        let b = pick_sources(3, 12, 50, 30);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 30);
        assert!(a.iter().all(|&i| i < 50));
    }

    #[test]
    fn too_small_pool_is_an_error() {
        let dir = tempdir().unwrap();
        let speech = dir.path().join("speech");
        write_constant(&speech.join("s0.wav"), 10, 20, 100);
        let err = build_babble(&speech, dir.path(), &ShardSpec::single(), &settings(2, 1))
            .unwrap_err();
        assert!(matches!(err, NoiseError::NotEnoughSources { needed: 2, available: 1 }));
    }

    #[test]
    fn writes_clips_and_provenance() {
        let dir = tempdir().unwrap();
        let speech = dir.path().join("speech");
        for i in 0..5 {
            write_constant(&speech.join(format!("s{}.wav", i)), 100 * i as i16, 20 + i, 100);
        }
        let out = dir.path().join("babble");
        let report = build_babble(&speech, &out, &ShardSpec::single(), &settings(3, 4)).unwrap();

        assert_eq!(report.written, 4);
        let lines: Vec<String> = fs::read_to_string(out.join("babble.sources.0"))
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("babble-000000\t"));
        let ids: Vec<&str> = lines[2].split('\t').nth(1).unwrap().split(',').collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| id.starts_with('s')));
        assert!(out.join("babble-000003.wav").is_file());
    }

    #[test]
    fn sharding_matches_single_run() {
        let dir = tempdir().unwrap();
        let speech = dir.path().join("speech");
        for i in 0..6 {
            write_constant(&speech.join(format!("s{}.wav", i)), 50 * i as i16, 30, 100);
        }
        let whole = dir.path().join("whole");
        let split = dir.path().join("split");
        build_babble(&speech, &whole, &ShardSpec::single(), &settings(2, 5)).unwrap();
        for rank in 0..2 {
            let spec = ShardSpec::new(rank, 2).unwrap();
            build_babble(&speech, &split, &spec, &settings(2, 5)).unwrap();
        }
        for k in 0..5 {
            let name = format!("babble-{:06}.wav", k);
            assert_eq!(
                fs::read(whole.join(&name)).unwrap(),
                fs::read(split.join(&name)).unwrap()
            );
        }
    }
}
