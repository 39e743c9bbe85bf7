//! Per-shard clip processing.
//!
//! A worker owns one contiguous slice of the clip manifest and runs each of
//! its clips through a fixed sequence of steps.
//!
//! # Architecture
//!
//! ```text
//! ShardRunner (rayon pool, input-ordered results)
//!     └── ClipPipeline
//!             ├── Step: Detect   (landmark file, cached)
//!             ├── Step: Smooth   (fill misses, moving average)
//!             ├── Step: Align    (similarity warp + ROI crop -> staged video)
//!             └── Step: Audio    (trimmed mono WAV, staged)
//! ```
//!
//! Video and audio are promoted together once every step has passed; a
//! failed clip keeps neither. The runner then counts the outputs and writes
//! `nframes.*.<rank>`, `file.list.<rank>`, `label.list.<rank>` and
//! `failed.<rank>.tsv`.

mod errors;
mod pipeline;
mod runner;
mod step;
pub mod steps;
mod types;

pub use errors::{ClipError, ClipResult, ShardError, ShardResult};
pub use pipeline::{ClipPipeline, ClipRunResult};
pub use runner::{RunMode, ShardReport, ShardRunner, FAILED};
pub use step::ClipStep;
pub use steps::{AlignStep, AudioStep, DetectStep, SmoothStep};
pub use types::{ClipState, ProgressCallback, ShardContext, StepOutcome};
