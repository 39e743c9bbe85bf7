//! Frame count records.

use serde::{Deserialize, Serialize};

/// Frame counts of one clip's final artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCount {
    /// Clip identifier.
    pub clip_id: String,
    /// Audio samples per channel.
    pub audio_frames: u64,
    /// Decoded video frames.
    pub video_frames: u64,
}

impl FrameCount {
    /// Create a new record.
    pub fn new(clip_id: impl Into<String>, audio_frames: u64, video_frames: u64) -> Self {
        Self {
            clip_id: clip_id.into(),
            audio_frames,
            video_frames,
        }
    }
}
