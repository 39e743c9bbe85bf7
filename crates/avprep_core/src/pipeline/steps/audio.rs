//! Audio step - trim the clip's audio to the same window as the video.

use crate::media::MediaError;
use crate::output::AtomicOutput;
use crate::pipeline::errors::{ClipError, ClipResult};
use crate::pipeline::step::ClipStep;
use crate::pipeline::types::{ClipState, ShardContext, StepOutcome};

pub struct AudioStep;

impl AudioStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AudioStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipStep for AudioStep {
    fn name(&self) -> &str {
        "Audio"
    }

    fn description(&self) -> &str {
        "Extract mono audio for the clip window"
    }

    fn validate_input(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        let input = state.clip.audio_input();
        if !input.is_file() {
            return Err(MediaError::SourceNotFound(input.to_path_buf()).into());
        }
        Ok(())
    }

    fn execute(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<StepOutcome> {
        let clip = &state.clip;
        let rate = ctx.settings.media.audio_sample_rate;

        let out = AtomicOutput::new(ctx.layout.audio_path(&clip.id))
            .map_err(|e| ClipError::io("creating audio output", e))?;
        ctx.backend
            .extract_audio(clip.audio_input(), out.path(), clip.bounds.as_ref(), rate)?;

        ctx.logger.clip(&clip.id, &format!("Audio written at {} Hz", rate));
        state.audio = Some(out);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &ShardContext, state: &ClipState) -> ClipResult<()> {
        match &state.audio {
            Some(out) if out.is_written() => Ok(()),
            Some(out) => Err(MediaError::SourceNotFound(out.path().to_path_buf()).into()),
            None => Err(ClipError::invalid_output("audio not staged")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_step_has_correct_name() {
        assert_eq!(AudioStep::new().name(), "Audio");
    }
}
