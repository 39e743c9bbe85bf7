//! Smooth step - fill detector misses and smooth the landmark track.

use crate::landmarks::fill_and_smooth;
use crate::pipeline::errors::{ClipError, ClipResult};
use crate::pipeline::step::ClipStep;
use crate::pipeline::types::{ClipState, ShardContext, StepOutcome};

pub struct SmoothStep;

impl SmoothStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SmoothStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStep for SmoothStep {
    fn name(&self) -> &str {
        "Smooth"
    }

    fn description(&self) -> &str {
        "Interpolate missing frames and smooth landmarks"
    }

    fn validate_input(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        if !state.has_landmarks() {
            return Err(ClipError::invalid_input("no landmarks to smooth"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<StepOutcome> {
        let Some(seq) = state.landmarks.as_ref() else {
            return Err(ClipError::invalid_input("no landmarks to smooth"));
        };

        let missing = seq.len() - seq.valid_count();
        let track = fill_and_smooth(seq, ctx.settings.smoothing.window)?;
        if missing > 0 {
            ctx.logger.clip(
                state.id(),
                &format!("Filled {} frames without a face", missing),
            );
        }

        state.track = Some(track);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        match (&state.landmarks, &state.track) {
            (Some(seq), Some(track)) if seq.len() == track.len() => Ok(()),
            (_, Some(_)) => Err(ClipError::invalid_output(
                "smoothed track length differs from landmark sequence",
            )),
            _ => Err(ClipError::invalid_output("smoothed track not recorded")),
        }
    }
}
