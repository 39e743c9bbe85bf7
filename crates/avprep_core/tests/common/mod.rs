//! Test doubles for shard runs: a text-file media backend and a scripted
//! face model.
//!
//! A fake source video is a text file `frames <n> <w> <h> <v0,v1,...>`;
//! frame `i` is filled with value `v[i % len]`. Value 0 means "no face".

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};

use avprep_core::config::Settings;
use avprep_core::detect::{DetectError, FaceBox, FaceModel, FaceModelFactory};
use avprep_core::landmarks::file::format_line;
use avprep_core::media::{
    wav, FrameSink, FrameSource, MediaBackend, MediaError, MediaResult, VideoInfo,
};
use avprep_core::models::{ClipRecord, Keypoints, Point2, TimeBoundary};
use avprep_core::pipeline::{RunMode, ShardRunner};
use avprep_core::shard::ShardSpec;

pub const FRAME_SIZE: u32 = 32;
pub const SAMPLES_PER_FRAME: usize = 640;

pub fn reference_keypoints() -> Keypoints {
    Keypoints::new(vec![
        Point2::new(10.0, 10.0),
        Point2::new(22.0, 10.0),
        Point2::new(16.0, 18.0),
        Point2::new(12.0, 24.0),
        Point2::new(20.0, 24.0),
        Point2::new(16.0, 27.0),
    ])
}

/// Write a fake source video.
pub fn write_video(path: &Path, values: &[u8], frames: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    fs::write(
        path,
        format!("frames {} {} {} {}\n", frames, FRAME_SIZE, FRAME_SIZE, values.join(",")),
    )
    .unwrap();
}

struct FakeVideo {
    frames: usize,
    width: u32,
    height: u32,
    values: Vec<u8>,
}

fn read_fake_video(path: &Path) -> MediaResult<FakeVideo> {
    let content =
        fs::read_to_string(path).map_err(|_| MediaError::SourceNotFound(path.to_path_buf()))?;
    let invalid = || MediaError::InvalidData {
        path: path.to_path_buf(),
        message: "not a fake video".to_string(),
    };
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != 5 || fields[0] != "frames" {
        return Err(invalid());
    }
    let values = fields[4]
        .split(',')
        .map(|v| v.parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    Ok(FakeVideo {
        frames: fields[1].parse().map_err(|_| invalid())?,
        width: fields[2].parse().map_err(|_| invalid())?,
        height: fields[3].parse().map_err(|_| invalid())?,
        values,
    })
}

struct FakeSource {
    info: VideoInfo,
    video: FakeVideo,
    next: usize,
}

impl FrameSource for FakeSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.next >= self.video.frames {
            return Ok(None);
        }
        let v = self.video.values[self.next % self.video.values.len()];
        self.next += 1;
        Ok(Some(RgbImage::from_pixel(
            self.video.width,
            self.video.height,
            Rgb([v, v, v]),
        )))
    }
}

struct FakeSink {
    path: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::InvalidData {
                path: self.path.clone(),
                message: "frame size changed".to_string(),
            });
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> MediaResult<u64> {
        fs::write(
            &self.path,
            format!("encoded {} {} {}\n", self.frames, self.width, self.height),
        )?;
        Ok(self.frames)
    }
}

/// Media backend over fake text videos; audio is real WAV.
#[derive(Default)]
pub struct FakeBackend {
    pub opened: AtomicUsize,
    /// Pretend the media tools are missing.
    pub missing_tools: bool,
}

impl MediaBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        !self.missing_tools
    }

    fn open_video(
        &self,
        path: &Path,
        _bounds: Option<&TimeBoundary>,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let video = read_fake_video(path)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let info = VideoInfo {
            width: video.width,
            height: video.height,
            fps: 25.0,
            fps_fraction: (25, 1),
            duration_secs: video.frames as f64 / 25.0,
            frame_count: video.frames as u64,
        };
        Ok(Box::new(FakeSource {
            info,
            video,
            next: 0,
        }))
    }

    fn create_video(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        _fps_fraction: (u32, u32),
    ) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(FakeSink {
            path: path.to_path_buf(),
            width,
            height,
            frames: 0,
        }))
    }

    fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        _bounds: Option<&TimeBoundary>,
        sample_rate: u32,
    ) -> MediaResult<()> {
        let video = read_fake_video(input)?;
        let samples = vec![100i16; video.frames * SAMPLES_PER_FRAME];
        wav::write_mono(output, &samples, sample_rate)
    }

    fn count_video_frames(&self, path: &Path) -> MediaResult<u64> {
        let content = fs::read_to_string(path)?;
        content
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| MediaError::InvalidData {
                path: path.to_path_buf(),
                message: "not an encoded fake video".to_string(),
            })
    }
}

/// Face model that finds the reference face in every non-black frame.
pub struct ScriptedModel {
    /// Calls to `detect` that fail before the model starts working.
    fail_first: usize,
    calls: Arc<AtomicUsize>,
}

impl FaceModel for ScriptedModel {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first > 0 {
            self.fail_first -= 1;
            return Err(DetectError::Protocol("detector hiccup".to_string()));
        }
        if frame.get_pixel(0, 0)[0] == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![FaceBox::new(0.0, 0.0, FRAME_SIZE as f64, FRAME_SIZE as f64)])
    }

    fn landmarks(&mut self, _face: &FaceBox) -> Result<Keypoints, DetectError> {
        Ok(reference_keypoints())
    }
}

/// Factory for [`ScriptedModel`]; the first `flaky` models fail once.
#[derive(Default)]
pub struct ScriptedFactory {
    pub flaky: usize,
    /// Refuse to start any model, like a missing detector binary.
    pub unspawnable: bool,
    pub created: AtomicUsize,
    /// `detect` calls across all models.
    pub detect_calls: Arc<AtomicUsize>,
}

impl FaceModelFactory for ScriptedFactory {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create(&self) -> Result<Box<dyn FaceModel>, DetectError> {
        if self.unspawnable {
            return Err(DetectError::Spawn {
                program: "face-landmarker".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            fail_first: usize::from(n < self.flaky),
            calls: Arc::clone(&self.detect_calls),
        }))
    }
}

/// Settings rooted at `root` for 32x32 fake videos and 6 keypoints.
pub fn test_settings(root: &Path, threads: usize) -> Settings {
    let mut settings = Settings::default();
    let out = root.join("prepared");
    settings.paths.output_dir = out.display().to_string();
    settings.paths.video_dir = out.join("video").display().to_string();
    settings.paths.audio_dir = out.join("audio").display().to_string();
    settings.paths.landmark_dir = out.join("landmarks").display().to_string();
    settings.paths.logs_dir = out.join("logs").display().to_string();

    let reference = root.join("reference_face.txt");
    fs::write(&reference, format!("{}\n", format_line(Some(&reference_keypoints())))).unwrap();
    settings.paths.reference_face = reference.display().to_string();

    settings.detection.num_keypoints = 6;
    settings.detection.max_retries = 2;
    settings.alignment.stable_points = vec![0, 1, 2];
    settings.alignment.mouth_points = vec![3, 4, 5];
    settings.alignment.crop_width = 8;
    settings.alignment.crop_height = 8;
    settings.smoothing.window = 3;
    settings.workers.threads = threads;
    settings
}

pub fn runner(settings: &Settings, spec: ShardSpec, mode: RunMode) -> ShardRunner {
    runner_with_factory(settings, spec, mode, Arc::new(ScriptedFactory::default()))
}

pub fn runner_with_factory(
    settings: &Settings,
    spec: ShardSpec,
    mode: RunMode,
    factory: Arc<dyn FaceModelFactory>,
) -> ShardRunner {
    ShardRunner::from_settings(
        settings.clone(),
        spec,
        mode,
        Arc::new(FakeBackend::default()),
        factory,
        None,
        None,
    )
    .unwrap()
}

/// Clip `id` with a fake video of `frames` frames of `values`.
pub fn clip(root: &Path, id: &str, values: &[u8], frames: usize) -> ClipRecord {
    let path = root.join("src").join(format!("{}.mp4", id));
    write_video(&path, values, frames);
    ClipRecord::new(id, path).with_transcript(format!("words of {}", id))
}

/// The three-clip corpus: the middle clip never shows a face.
pub fn three_clips(root: &Path) -> Vec<ClipRecord> {
    vec![
        clip(root, "c1", &[200], 5),
        clip(root, "c2", &[0], 4),
        clip(root, "c3", &[150], 7),
    ]
}

pub fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}
