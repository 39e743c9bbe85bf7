//! Clip pipeline that executes steps in sequence.

use super::errors::ClipResult;
use super::step::ClipStep;
use super::types::{ClipState, ShardContext, StepOutcome};

/// Ordered steps applied to every clip of a shard.
///
/// Each step is validated before and after execution; the first error ends
/// the clip. The pipeline is shared by all clip tasks of a worker.
pub struct ClipPipeline {
    steps: Vec<Box<dyn ClipStep>>,
}

impl ClipPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: ClipStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: ClipStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Run every step on one clip.
    pub fn run(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<ClipRunResult> {
        let mut result = ClipRunResult::default();

        for step in &self.steps {
            let step_name = step.name();
            ctx.logger
                .debug(&format!("[{}] {}: {}", state.id(), step_name, step.description()));

            step.validate_input(ctx, state)?;

            match step.execute(ctx, state)? {
                StepOutcome::Success => {
                    step.validate_output(ctx, state)?;
                    result.steps_completed.push(step_name.to_string());
                }
                StepOutcome::Skipped(reason) => {
                    ctx.logger
                        .clip(state.id(), &format!("{} skipped: {}", step_name, reason));
                    result.steps_skipped.push(step_name.to_string());
                }
            }
        }

        Ok(result)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for ClipPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Steps a clip went through.
#[derive(Debug, Clone, Default)]
pub struct ClipRunResult {
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
}
