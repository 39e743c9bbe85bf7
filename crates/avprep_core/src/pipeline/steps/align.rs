//! Align step - crop the stabilized mouth region into a staged video.

use crate::media::MediaError;
use crate::output::AtomicOutput;
use crate::pipeline::errors::{ClipError, ClipResult};
use crate::pipeline::step::ClipStep;
use crate::pipeline::types::{ClipState, ShardContext, StepOutcome};

/// Decodes the clip a second time, warps every frame onto the reference
/// face and encodes the ROI crops.
pub struct AlignStep;

impl AlignStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AlignStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStep for AlignStep {
    fn name(&self) -> &str {
        "Align"
    }

    fn description(&self) -> &str {
        "Align frames to the reference face and crop the mouth"
    }

    fn validate_input(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        if !state.has_track() {
            return Err(ClipError::invalid_input("no smoothed landmark track"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<StepOutcome> {
        let Some(track) = state.track.as_ref() else {
            return Err(ClipError::invalid_input("no smoothed landmark track"));
        };
        let clip = &state.clip;

        let mut source = ctx
            .backend
            .open_video(&clip.video_path, clip.bounds.as_ref())?;
        let fps = source.info().fps_fraction;
        let roi = *ctx.aligner.roi();

        let final_path = ctx.layout.video_path(&clip.id);
        let out = AtomicOutput::new(&final_path)
            .map_err(|e| ClipError::io("creating video output", e))?;
        let mut sink = ctx
            .backend
            .create_video(out.path(), roi.width, roi.height, fps)?;

        let stats = ctx
            .aligner
            .align_clip(source.as_mut(), sink.as_mut(), track)?;
        let encoded = sink.finish()?;

        if stats.fallbacks > 0 {
            ctx.logger.warn(&format!(
                "[{}] {} of {} frames reused the previous transform",
                clip.id, stats.fallbacks, stats.frames
            ));
        }
        ctx.logger.clip(
            &clip.id,
            &format!(
                "Cropped {} frames ({}x{} @ {}/{})",
                encoded, roi.width, roi.height, fps.0, fps.1
            ),
        );

        state.align = Some(stats);
        state.video = Some(out);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        match &state.video {
            Some(out) if out.is_written() => Ok(()),
            Some(out) => Err(MediaError::SourceNotFound(out.path().to_path_buf()).into()),
            None => Err(ClipError::invalid_output("cropped video not staged")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_step_has_correct_name() {
        assert_eq!(AlignStep::new().name(), "Align");
    }
}
