//! Frame counting of finished outputs.
//!
//! Counts always come from re-opening the promoted files: audio samples from
//! the WAV header, video frames by decoding. Per-shard count files hold one
//! integer per line in shard-local input order.

use std::fs;
use std::io;
use std::path::Path;

use rayon::prelude::*;

use crate::manifest::{write_shard_lists, FailureKind, FailureRecord, ManifestError};
use crate::media::{MediaBackend, MediaError};
use crate::models::{ClipRecord, FrameCount};
use crate::output::{write_lines_atomic, OutputLayout};
use crate::shard::ShardSpec;

/// Base name of the audio count file.
pub const NFRAMES_AUDIO: &str = "nframes.audio";
/// Base name of the video count file.
pub const NFRAMES_VIDEO: &str = "nframes.video";

/// Counting errors.
#[derive(Debug, thiserror::Error)]
pub enum CountError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Count the final outputs of one clip.
pub fn count_clip(
    backend: &dyn MediaBackend,
    layout: &OutputLayout,
    clip_id: &str,
) -> Result<FrameCount, MediaError> {
    let audio_frames = backend.count_audio_frames(&layout.audio_path(clip_id))?;
    let video_frames = backend.count_video_frames(&layout.video_path(clip_id))?;
    Ok(FrameCount::new(clip_id, audio_frames, video_frames))
}

/// Write `nframes.audio.<rank>` and `nframes.video.<rank>`.
pub fn write_counts(dir: &Path, spec: &ShardSpec, counts: &[FrameCount]) -> Result<(), CountError> {
    let audio = dir.join(spec.suffixed(NFRAMES_AUDIO));
    write_lines_atomic(&audio, counts.iter().map(|c| c.audio_frames.to_string())).map_err(
        |source| CountError::Io {
            path: audio.clone(),
            source,
        },
    )?;

    let video = dir.join(spec.suffixed(NFRAMES_VIDEO));
    write_lines_atomic(&video, counts.iter().map(|c| c.video_frames.to_string())).map_err(
        |source| CountError::Io {
            path: video.clone(),
            source,
        },
    )?;
    Ok(())
}

/// Read a count file (one integer per line).
pub fn read_counts(path: &Path) -> io::Result<Vec<u64>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            l.trim()
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", l, e)))
        })
        .collect()
}

/// Result of recounting a shard.
#[derive(Debug, Clone, Default)]
pub struct RecountReport {
    /// Counts of clips with complete outputs, in input order.
    pub counts: Vec<FrameCount>,
    /// Clips that could not be counted, in input order.
    pub failures: Vec<FailureRecord>,
}

/// Recount existing outputs of a shard's clips and rewrite its count and
/// list files.
///
/// Clips without outputs (or whose outputs cannot be read) are reported as
/// failures and left out of every file.
pub fn recount_shard(
    backend: &dyn MediaBackend,
    layout: &OutputLayout,
    spec: &ShardSpec,
    clips: &[ClipRecord],
) -> Result<RecountReport, CountError> {
    let results: Vec<Result<FrameCount, FailureRecord>> = clips
        .par_iter()
        .map(|clip| {
            if !layout.is_complete(&clip.id) {
                return Err(FailureRecord::new(
                    &clip.id,
                    FailureKind::MissingOutput,
                    "video or audio output missing",
                ));
            }
            count_clip(backend, layout, &clip.id)
                .map_err(|e| FailureRecord::new(&clip.id, FailureKind::MediaError, e.to_string()))
        })
        .collect();

    let mut report = RecountReport::default();
    let mut counted: Vec<&ClipRecord> = Vec::new();
    for (clip, result) in clips.iter().zip(results) {
        match result {
            Ok(count) => {
                counted.push(clip);
                report.counts.push(count);
            }
            Err(failure) => report.failures.push(failure),
        }
    }

    write_counts(&layout.output_dir, spec, &report.counts)?;
    write_shard_lists(&layout.output_dir, spec, &counted)?;

    tracing::info!(
        "[Count] Shard {}: counted {} clips, {} without usable outputs",
        spec,
        report.counts.len(),
        report.failures.len()
    );
    Ok(report)
}
