//! Detect step - per-frame face landmarks of a clip.
//!
//! Landmark files double as a cache: when one exists from an earlier run it
//! is loaded instead of decoding and detecting again.

use crate::detect::{detect_sequence, DetectError};
use crate::landmarks::{read_landmarks, write_landmarks};
use crate::media::MediaError;
use crate::models::{ClipRecord, LandmarkSequence};
use crate::pipeline::errors::{ClipError, ClipResult};
use crate::pipeline::step::ClipStep;
use crate::pipeline::types::{ClipState, ShardContext, StepOutcome};

/// Runs the face model over every frame and stores the landmark file.
pub struct DetectStep;

impl DetectStep {
    pub fn new() -> Self {
        Self
    }

    /// Decode and detect, retrying with a fresh model after I/O errors.
    fn detect_with_retries(
        &self,
        ctx: &ShardContext,
        clip: &ClipRecord,
        attempts: &mut u32,
    ) -> Result<LandmarkSequence, DetectError> {
        let max_retries = ctx.settings.detection.max_retries;
        let num_keypoints = ctx.num_keypoints();

        loop {
            *attempts += 1;
            let result = ctx
                .backend
                .open_video(&clip.video_path, clip.bounds.as_ref())
                .map_err(DetectError::from)
                .and_then(|mut source| {
                    ctx.models
                        .with_model(|model| detect_sequence(model, source.as_mut(), num_keypoints))
                });

            match result {
                Ok(seq) => return Ok(seq),
                Err(e) if e.is_retryable() && *attempts <= max_retries => {
                    ctx.logger.warn(&format!(
                        "[{}] Detection attempt {} failed, retrying: {}",
                        clip.id, attempts, e
                    ));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for DetectStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStep for DetectStep {
    fn name(&self) -> &str {
        "Detect"
    }

    fn description(&self) -> &str {
        "Detect face landmarks in every frame"
    }

    fn validate_input(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        if !state.clip.video_path.is_file() {
            return Err(MediaError::SourceNotFound(state.clip.video_path.clone()).into());
        }
        Ok(())
    }

    fn execute(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<StepOutcome> {
        let path = ctx.layout.landmark_path(state.id());

        if ctx.settings.detection.cache_landmarks && path.is_file() {
            match read_landmarks(&path, Some(ctx.num_keypoints())) {
                Ok(seq) => {
                    ctx.logger.clip(
                        state.id(),
                        &format!("Loaded {} cached landmark frames", seq.len()),
                    );
                    state.landmarks = Some(seq);
                    state.landmarks_cached = true;
                    return Ok(StepOutcome::Success);
                }
                Err(e) => {
                    ctx.logger
                        .warn(&format!("[{}] Ignoring landmark cache: {}", state.id(), e));
                }
            }
        }

        let seq = self.detect_with_retries(ctx, &state.clip, &mut state.detect_attempts)?;
        write_landmarks(&path, &seq)?;

        ctx.logger.clip(
            state.id(),
            &format!(
                "Detected a face in {} of {} frames",
                seq.valid_count(),
                seq.len()
            ),
        );
        state.landmarks = Some(seq);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        let Some(seq) = state.landmarks.as_ref() else {
            return Err(ClipError::invalid_output("landmarks not recorded"));
        };
        if seq.is_empty() {
            return Err(MediaError::InvalidData {
                path: state.clip.video_path.clone(),
                message: "no frames decoded".to_string(),
            }
            .into());
        }
        if seq.is_all_missing() {
            return Err(ClipError::NoFace);
        }
        Ok(())
    }
}
