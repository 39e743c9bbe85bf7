//! Core types for shard runs.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::align::{AlignStats, MouthAligner};
use crate::config::Settings;
use crate::detect::ModelPool;
use crate::logging::ShardLogger;
use crate::media::MediaBackend;
use crate::models::{ClipRecord, Keypoints, LandmarkSequence};
use crate::output::{promote_all, AtomicOutput, OutputLayout};
use crate::shard::ShardSpec;

/// Progress callback type for reporting shard progress.
///
/// Arguments: (clips_done, clips_total, clip_id)
pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Read-only context shared by every clip task of a shard.
///
/// Clip tasks run concurrently, so everything here is either immutable or
/// internally synchronized. Per-clip results go in [`ClipState`].
pub struct ShardContext {
    /// Which slice of the manifest this worker owns.
    pub spec: ShardSpec,
    /// Worker settings.
    pub settings: Settings,
    /// Aligner built around the shared reference face.
    pub aligner: MouthAligner,
    /// Decoding, encoding and counting.
    pub backend: Arc<dyn MediaBackend>,
    /// Face models checked out by clip tasks.
    pub models: ModelPool,
    /// Output paths.
    pub layout: OutputLayout,
    /// Per-shard logger.
    pub logger: Arc<ShardLogger>,
    progress_callback: Option<ProgressCallback>,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl ShardContext {
    pub fn new(
        spec: ShardSpec,
        settings: Settings,
        aligner: MouthAligner,
        backend: Arc<dyn MediaBackend>,
        models: ModelPool,
        layout: OutputLayout,
        logger: Arc<ShardLogger>,
    ) -> Self {
        Self {
            spec,
            settings,
            aligner,
            backend,
            models,
            layout,
            logger,
            progress_callback: None,
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Reset the progress counters for a run over `total` clips.
    pub(crate) fn start_progress(&self, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    /// Record one finished clip and report it.
    pub(crate) fn clip_finished(&self, clip_id: &str) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        self.logger.progress_items(done, total);
        if let Some(ref callback) = self.progress_callback {
            callback(done, total, clip_id);
        }
    }

    /// Keypoints per face.
    pub fn num_keypoints(&self) -> usize {
        self.settings.detection.num_keypoints
    }
}

/// Mutable state of one clip as it moves through the steps.
///
/// Media outputs stay staged until the whole clip succeeds; dropping the
/// state removes them.
#[derive(Debug)]
pub struct ClipState {
    pub clip: ClipRecord,
    /// Raw per-frame landmarks (from detection or the cache).
    pub landmarks: Option<LandmarkSequence>,
    /// Whether `landmarks` came from an earlier run.
    pub landmarks_cached: bool,
    /// Detection attempts made for this clip.
    pub detect_attempts: u32,
    /// Gap-filled, smoothed track.
    pub track: Option<Vec<Keypoints>>,
    pub align: Option<AlignStats>,
    /// Staged cropped video.
    pub video: Option<AtomicOutput>,
    /// Staged audio.
    pub audio: Option<AtomicOutput>,
}

impl ClipState {
    pub fn new(clip: ClipRecord) -> Self {
        Self {
            clip,
            landmarks: None,
            landmarks_cached: false,
            detect_attempts: 0,
            track: None,
            align: None,
            video: None,
            audio: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.clip.id
    }

    pub fn has_landmarks(&self) -> bool {
        self.landmarks.is_some()
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    /// Move every staged output to its final path in one go.
    pub fn promote_outputs(&mut self) -> io::Result<Vec<PathBuf>> {
        let staged: Vec<AtomicOutput> = self
            .video
            .take()
            .into_iter()
            .chain(self.audio.take())
            .collect();
        promote_all(staged)
    }
}

/// Result of executing a clip step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step had nothing to do (not an error).
    Skipped(String),
}
