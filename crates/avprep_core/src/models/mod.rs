//! Data models for avprep.
//!
//! This module contains the core data structures shared by every stage:
//! - Clip records read from the corpus manifest
//! - Landmark points, keypoint sets and per-clip landmark sequences
//! - Frame counts and noise clip records

mod clip;
mod counts;
mod landmarks;
mod noise;

// Re-export all public types
pub use clip::{AudioSource, ClipRecord, TimeBoundary};
pub use counts::FrameCount;
pub use landmarks::{Keypoints, LandmarkSequence, Point2};
pub use noise::{NoiseCategory, NoiseClip};
