//! Media access: video decode/encode, audio extraction and probing.
//!
//! The pipeline only talks to the [`MediaBackend`] trait. [`FfmpegBackend`]
//! is the production implementation; tests substitute their own.

mod error;
mod ffmpeg;
mod probe;
pub mod wav;

use std::path::Path;

use image::RgbImage;

pub use error::{MediaError, MediaResult};
pub use ffmpeg::FfmpegBackend;
pub use probe::{count_video_frames, parse_fps_fraction, probe_video, VideoInfo};

use crate::models::TimeBoundary;

/// Sequential reader of decoded frames.
pub trait FrameSource: Send {
    /// Properties of the stream being decoded.
    fn info(&self) -> &VideoInfo;

    /// Next frame, or `None` at the end of the stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Sequential writer of frames to an encoded video.
pub trait FrameSink: Send {
    /// Append one frame; its dimensions must match the sink's.
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output. Returns the number of frames written.
    fn finish(self: Box<Self>) -> MediaResult<u64>;
}

/// Media operations used by the pipeline.
pub trait MediaBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the backend's tools can run at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Start decoding `path`, restricted to `bounds` if given.
    fn open_video(
        &self,
        path: &Path,
        bounds: Option<&TimeBoundary>,
    ) -> MediaResult<Box<dyn FrameSource>>;

    /// Start encoding a `width`x`height` video at `fps_fraction` into `path`.
    fn create_video(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps_fraction: (u32, u32),
    ) -> MediaResult<Box<dyn FrameSink>>;

    /// Extract mono 16-bit audio at `sample_rate` from `input` into a WAV file.
    fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        bounds: Option<&TimeBoundary>,
        sample_rate: u32,
    ) -> MediaResult<()>;

    /// Count decoded frames of a finished video.
    fn count_video_frames(&self, path: &Path) -> MediaResult<u64>;

    /// Count samples per channel of a finished WAV file.
    fn count_audio_frames(&self, path: &Path) -> MediaResult<u64> {
        wav::wav_info(path).map(|info| info.num_frames)
    }
}
