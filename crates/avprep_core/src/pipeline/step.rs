//! Clip step trait definition.

use super::errors::ClipResult;
use super::types::{ClipState, ShardContext, StepOutcome};

/// One stage of per-clip processing.
///
/// The clip pipeline calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the step's work
/// 3. `validate_output` - Verify the step produced valid output
///
/// Steps run concurrently for different clips, so they must not keep
/// per-clip data in `self`.
pub trait ClipStep: Send + Sync {
    /// Step name (for logging and error context).
    fn name(&self) -> &str;

    /// Validate inputs before execution.
    fn validate_input(&self, ctx: &ShardContext, state: &ClipState) -> ClipResult<()>;

    /// Execute the step and record results in `state`.
    fn execute(&self, ctx: &ShardContext, state: &mut ClipState) -> ClipResult<StepOutcome>;

    /// Validate outputs after a successful `execute`.
    fn validate_output(&self, ctx: &ShardContext, state: &ClipState) -> ClipResult<()>;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}
