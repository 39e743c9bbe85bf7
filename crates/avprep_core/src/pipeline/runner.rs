//! Shard runner: processes the clips a worker owns.
//!
//! Clips run in parallel on a dedicated rayon pool; results are collected
//! in input order, so every shard-level file is independent of scheduling.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::align::{MouthAligner, ReferenceFace};
use crate::config::Settings;
use crate::counter::{count_clip, write_counts};
use crate::detect::{FaceModelFactory, ModelPool};
use crate::logging::{LogCallback, LogConfig, ShardLoggerBuilder};
use crate::manifest::{write_failures, write_shard_lists, FailureKind, FailureRecord};
use crate::media::MediaBackend;
use crate::models::{ClipRecord, FrameCount};
use crate::output::OutputLayout;
use crate::shard::{ShardAssignment, ShardSpec};

use super::errors::{ClipError, ClipResult, ShardError, ShardResult};
use super::steps::{AlignStep, AudioStep, DetectStep, SmoothStep};
use super::types::{ClipState, ProgressCallback, ShardContext};
use super::ClipPipeline;

/// Base name of the per-rank failure manifest.
pub const FAILED: &str = "failed";

/// What a shard run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Cropped video, audio, counts and lists.
    #[default]
    Crop,
    /// Landmark files only.
    Landmarks,
}

impl RunMode {
    /// Steps applied to each clip.
    pub fn pipeline(&self) -> ClipPipeline {
        match self {
            RunMode::Crop => ClipPipeline::new()
                .with_step(DetectStep::new())
                .with_step(SmoothStep::new())
                .with_step(AlignStep::new())
                .with_step(AudioStep::new()),
            RunMode::Landmarks => ClipPipeline::new().with_step(DetectStep::new()),
        }
    }

    fn failure_base(&self) -> &'static str {
        match self {
            RunMode::Crop => FAILED,
            RunMode::Landmarks => "failed.landmarks",
        }
    }
}

/// Summary of one shard run.
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub assignment: ShardAssignment,
    pub mode: RunMode,
    /// Clips run through the pipeline.
    pub processed: usize,
    /// Clips skipped because their outputs already existed.
    pub resumed: usize,
    /// Counts of successful clips, in input order (crop mode).
    pub counts: Vec<FrameCount>,
    /// Failed clips, in input order.
    pub failures: Vec<FailureRecord>,
    /// Stale partial files removed at startup.
    pub removed_partials: usize,
    pub failure_file: PathBuf,
}

impl ShardReport {
    /// Clips that ended with usable outputs.
    pub fn succeeded(&self) -> usize {
        self.assignment.len() - self.failures.len()
    }
}

enum ClipOutcome {
    Done {
        clip_index: usize,
        resumed: bool,
        count: Option<FrameCount>,
    },
    Failed(FailureRecord),
}

/// Runs a shard's clips through the pipeline and writes its shard files.
pub struct ShardRunner {
    ctx: ShardContext,
    mode: RunMode,
    pipeline: ClipPipeline,
}

impl ShardRunner {
    pub fn new(ctx: ShardContext, mode: RunMode) -> Self {
        Self {
            pipeline: mode.pipeline(),
            ctx,
            mode,
        }
    }

    /// Build a runner from settings.
    ///
    /// Validates the settings, loads the reference face and opens the shard
    /// log. Any failure here is fatal for the worker.
    pub fn from_settings(
        settings: Settings,
        spec: ShardSpec,
        mode: RunMode,
        backend: Arc<dyn MediaBackend>,
        factory: Arc<dyn FaceModelFactory>,
        log_callback: Option<LogCallback>,
        progress_callback: Option<ProgressCallback>,
    ) -> ShardResult<Self> {
        settings.validate().map_err(ShardError::Config)?;

        let logger = ShardLoggerBuilder::new(spec.label(), settings.paths.logs_dir())
            .config(LogConfig::from(&settings.logging))
            .maybe_callback(log_callback)
            .build()
            .map_err(ShardError::Logger)?;

        let reference = ReferenceFace::load(
            &settings.paths.reference_face(),
            settings.detection.num_keypoints,
            &settings.alignment,
        )?;
        let aligner = MouthAligner::from_settings(Arc::new(reference), &settings.alignment);
        let layout = OutputLayout::from_settings(&settings.paths);

        let mut ctx = ShardContext::new(
            spec,
            settings,
            aligner,
            backend,
            ModelPool::new(factory),
            layout,
            Arc::new(logger),
        );
        if let Some(callback) = progress_callback {
            ctx = ctx.with_progress_callback(callback);
        }
        Ok(Self::new(ctx, mode))
    }

    pub fn context(&self) -> &ShardContext {
        &self.ctx
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// `failed.<rank>.tsv` (or the landmark variant) in the output directory.
    pub fn failure_path(&self) -> PathBuf {
        let name = format!("{}.tsv", self.ctx.spec.suffixed(self.mode.failure_base()));
        self.ctx.layout.shard_file(&name)
    }

    fn thread_pool(&self) -> ShardResult<rayon::ThreadPool> {
        // 0 lets rayon pick one thread per core
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.ctx.settings.workers.threads)
            .thread_name(|i| format!("avprep-clip-{}", i))
            .build()
            .map_err(|e| ShardError::ThreadPool(e.to_string()))
    }

    /// Fail the worker when the media tools or the detector cannot run.
    fn check_ready(&self) -> ShardResult<()> {
        let ctx = &self.ctx;
        if !ctx.backend.is_available() {
            return Err(ShardError::Config(format!(
                "media backend '{}' is not available",
                ctx.backend.name()
            )));
        }
        ctx.models
            .warm_up()
            .map_err(|e| ShardError::Config(format!("face model unavailable: {}", e)))
    }

    fn prepare_dirs(&self) -> ShardResult<usize> {
        let layout = &self.ctx.layout;
        for dir in [
            &layout.output_dir,
            &layout.video_dir,
            &layout.audio_dir,
            &layout.landmark_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| ShardError::io(dir, e))?;
        }
        layout
            .sweep_partials()
            .map_err(|e| ShardError::io(&layout.output_dir, e))
    }

    /// Process the shard's share of `clips`.
    ///
    /// Per-clip failures are recorded, never returned. Errors are returned
    /// when the media backend or detector cannot start, or when the shard
    /// files cannot be written.
    pub fn run(&self, clips: &[ClipRecord]) -> ShardResult<ShardReport> {
        let ctx = &self.ctx;
        let assignment = ctx.spec.assign(clips.len());
        let owned = &clips[assignment.range.clone()];

        ctx.logger.phase(&format!("Shard {} ({:?})", ctx.spec, self.mode));
        ctx.logger.info(&format!(
            "Clips {}..{} of {} ({} owned)",
            assignment.range.start,
            assignment.range.end,
            clips.len(),
            owned.len()
        ));

        self.check_ready()?;
        let removed_partials = self.prepare_dirs()?;
        if removed_partials > 0 {
            ctx.logger.info(&format!(
                "Removed {} partial files from an interrupted run",
                removed_partials
            ));
        }

        ctx.start_progress(owned.len());
        let pool = self.thread_pool()?;
        let outcomes: Vec<ClipOutcome> = pool.install(|| {
            owned
                .par_iter()
                .enumerate()
                .map(|(i, clip)| self.process_clip(i, clip))
                .collect()
        });

        let mut report = ShardReport {
            assignment,
            mode: self.mode,
            processed: 0,
            resumed: 0,
            counts: Vec::new(),
            failures: Vec::new(),
            removed_partials,
            failure_file: self.failure_path(),
        };
        let mut counted: Vec<&ClipRecord> = Vec::new();
        for outcome in outcomes {
            match outcome {
                ClipOutcome::Done {
                    clip_index,
                    resumed,
                    count,
                } => {
                    if resumed {
                        report.resumed += 1;
                    } else {
                        report.processed += 1;
                    }
                    if let Some(count) = count {
                        counted.push(&owned[clip_index]);
                        report.counts.push(count);
                    }
                }
                ClipOutcome::Failed(failure) => {
                    report.processed += 1;
                    report.failures.push(failure);
                }
            }
        }

        ctx.logger.section("Shard files");
        if self.mode == RunMode::Crop {
            write_counts(&ctx.layout.output_dir, &ctx.spec, &report.counts)?;
            write_shard_lists(&ctx.layout.output_dir, &ctx.spec, &counted)?;
        }
        write_failures(&report.failure_file, &report.failures)?;

        if report.failures.is_empty() {
            ctx.logger.success(&format!(
                "Shard {}: {} clips done ({} resumed)",
                ctx.spec,
                report.succeeded(),
                report.resumed
            ));
        } else {
            ctx.logger.warn(&format!(
                "Shard {}: {} clips done ({} resumed), {} failed; see {}",
                ctx.spec,
                report.succeeded(),
                report.resumed,
                report.failures.len(),
                report.failure_file.display()
            ));
            ctx.logger.show_tail(&ctx.spec.label());
        }
        ctx.logger.flush();
        Ok(report)
    }

    fn process_clip(&self, clip_index: usize, clip: &ClipRecord) -> ClipOutcome {
        let ctx = &self.ctx;
        let resumed = self.mode == RunMode::Crop
            && ctx.settings.workers.resume
            && ctx.layout.is_complete(&clip.id);

        let result = if resumed {
            ctx.logger.clip(&clip.id, "Outputs present, skipping");
            Ok(())
        } else {
            self.run_pipeline(clip)
        };

        let outcome = match result {
            Err(e) => {
                let kind = e.kind();
                ctx.logger
                    .warn(&format!("[{}] Failed ({}): {}", clip.id, kind, e));
                self.discard_outputs(&clip.id);
                ClipOutcome::Failed(FailureRecord::new(&clip.id, kind, e.to_string()))
            }
            Ok(()) if self.mode == RunMode::Landmarks => ClipOutcome::Done {
                clip_index,
                resumed,
                count: None,
            },
            Ok(()) => match count_clip(ctx.backend.as_ref(), &ctx.layout, &clip.id) {
                Ok(count) => {
                    ctx.logger.clip(
                        &clip.id,
                        &format!(
                            "{} audio frames, {} video frames",
                            count.audio_frames, count.video_frames
                        ),
                    );
                    ClipOutcome::Done {
                        clip_index,
                        resumed,
                        count: Some(count),
                    }
                }
                Err(e) => {
                    ctx.logger
                        .warn(&format!("[{}] Counting failed: {}", clip.id, e));
                    self.discard_outputs(&clip.id);
                    ClipOutcome::Failed(FailureRecord::new(
                        &clip.id,
                        FailureKind::MediaError,
                        e.to_string(),
                    ))
                }
            },
        };

        ctx.clip_finished(&clip.id);
        outcome
    }

    /// Run the steps and promote the staged outputs together.
    fn run_pipeline(&self, clip: &ClipRecord) -> ClipResult<()> {
        let mut state = ClipState::new(clip.clone());
        self.pipeline.run(&self.ctx, &mut state)?;
        state
            .promote_outputs()
            .map_err(|e| ClipError::io("promoting clip outputs", e))?;
        Ok(())
    }

    /// A failed clip leaves no media behind, including outputs of earlier runs.
    fn discard_outputs(&self, clip_id: &str) {
        if self.mode != RunMode::Crop {
            return;
        }
        match self.ctx.layout.remove_outputs(clip_id) {
            Ok(0) => {}
            Ok(n) => self
                .ctx
                .logger
                .clip(clip_id, &format!("Removed {} outputs of the failed clip", n)),
            Err(e) => self.ctx.logger.warn(&format!(
                "[{}] Could not remove outputs of the failed clip: {}",
                clip_id, e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_build_their_steps() {
        assert_eq!(
            RunMode::Crop.pipeline().step_names(),
            vec!["Detect", "Smooth", "Align", "Audio"]
        );
        assert_eq!(RunMode::Landmarks.pipeline().step_names(), vec!["Detect"]);
    }
}
