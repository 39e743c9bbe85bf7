//! avprep core - sharded audio-visual corpus preparation
//!
//! Turns talking-head video clips into stabilized mouth-region crops with
//! trimmed audio and frame counts, and builds noise corpora for
//! augmentation. Workers are independent processes that each own one
//! contiguous shard of the clip manifest.

pub mod align;
pub mod config;
pub mod counter;
pub mod detect;
pub mod landmarks;
pub mod logging;
pub mod manifest;
pub mod media;
pub mod models;
pub mod noise;
pub mod output;
pub mod pipeline;
pub mod shard;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
