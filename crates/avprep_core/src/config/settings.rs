//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field has a serde default so partial files stay loadable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// External tools and encoding.
    #[serde(default)]
    pub media: MediaSettings,

    /// Face and landmark detection.
    #[serde(default)]
    pub detection: DetectionSettings,

    /// Mouth ROI alignment.
    #[serde(default)]
    pub alignment: AlignmentSettings,

    /// Landmark smoothing.
    #[serde(default)]
    pub smoothing: SmoothingSettings,

    /// Noise corpus construction.
    #[serde(default)]
    pub noise: NoiseSettings,

    /// Per-worker execution.
    #[serde(default)]
    pub workers: WorkerSettings,
}

/// Configuration sections, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Media,
    Detection,
    Alignment,
    Smoothing,
    Noise,
    Workers,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Media,
        ConfigSection::Detection,
        ConfigSection::Alignment,
        ConfigSection::Smoothing,
        ConfigSection::Noise,
        ConfigSection::Workers,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Media => "media",
            ConfigSection::Detection => "detection",
            ConfigSection::Alignment => "alignment",
            ConfigSection::Smoothing => "smoothing",
            ConfigSection::Noise => "noise",
            ConfigSection::Workers => "workers",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Input and output locations",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Media => "ffmpeg/ffprobe and encoding",
            ConfigSection::Detection => "External face and landmark detector",
            ConfigSection::Alignment => "Mouth ROI alignment to the reference face",
            ConfigSection::Smoothing => "Temporal landmark smoothing",
            ConfigSection::Noise => "Noise corpus slicing, babble synthesis and manifests",
            ConfigSection::Workers => "Per-worker execution",
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory for shard-level files (counts, lists, failures).
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Cropped mouth-ROI videos, `<video_dir>/<id>.mp4`.
    #[serde(default = "default_video_dir")]
    pub video_dir: String,

    /// Trimmed audio, `<audio_dir>/<id>.wav`.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Cached landmark files, `<landmark_dir>/<id>.txt`.
    #[serde(default = "default_landmark_dir")]
    pub landmark_dir: String,

    /// Per-worker log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Reference face keypoints (one line of `2*K` floats).
    #[serde(default = "default_reference_face")]
    pub reference_face: String,
}

fn default_output_dir() -> String {
    "prepared".to_string()
}

fn default_video_dir() -> String {
    "prepared/video".to_string()
}

fn default_audio_dir() -> String {
    "prepared/audio".to_string()
}

fn default_landmark_dir() -> String {
    "prepared/landmarks".to_string()
}

fn default_logs_dir() -> String {
    "prepared/logs".to_string()
}

fn default_reference_face() -> String {
    "reference_face.txt".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            video_dir: default_video_dir(),
            audio_dir: default_audio_dir(),
            landmark_dir: default_landmark_dir(),
            logs_dir: default_logs_dir(),
            reference_face: default_reference_face(),
        }
    }
}

impl PathSettings {
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn video_dir(&self) -> PathBuf {
        PathBuf::from(&self.video_dir)
    }

    pub fn audio_dir(&self) -> PathBuf {
        PathBuf::from(&self.audio_dir)
    }

    pub fn landmark_dir(&self) -> PathBuf {
        PathBuf::from(&self.landmark_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.logs_dir)
    }

    pub fn reference_face(&self) -> PathBuf {
        PathBuf::from(&self.reference_face)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to the worker log.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of recent lines kept for failure diagnosis.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    10
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// External tools and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    /// Sample rate of extracted audio.
    #[serde(default = "default_sample_rate")]
    pub audio_sample_rate: u32,

    /// Encoder for cropped video.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Constant rate factor for the encoder.
    #[serde(default = "default_video_crf")]
    pub video_crf: u8,

    #[serde(default = "default_video_preset")]
    pub video_preset: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_video_crf() -> u8 {
    20
}

fn default_video_preset() -> String {
    "medium".to_string()
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            audio_sample_rate: default_sample_rate(),
            video_codec: default_video_codec(),
            video_crf: default_video_crf(),
            video_preset: default_video_preset(),
        }
    }
}

/// External face and landmark detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Detector executable speaking the line protocol on stdin/stdout.
    #[serde(default = "default_detector_program")]
    pub program: String,

    /// Extra arguments passed before the model paths.
    #[serde(default)]
    pub args: Vec<String>,

    /// Face detector weights, passed as `--face-model`.
    #[serde(default)]
    pub face_model: String,

    /// Landmark predictor weights, passed as `--landmark-model`.
    #[serde(default)]
    pub landmark_model: String,

    /// Keypoints per face.
    #[serde(default = "default_num_keypoints")]
    pub num_keypoints: usize,

    /// Retries of a clip after a detector I/O error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Reuse landmark files from earlier runs.
    #[serde(default = "default_true")]
    pub cache_landmarks: bool,
}

fn default_detector_program() -> String {
    "face-landmarker".to_string()
}

fn default_num_keypoints() -> usize {
    68
}

fn default_max_retries() -> u32 {
    2
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            program: default_detector_program(),
            args: Vec::new(),
            face_model: String::new(),
            landmark_model: String::new(),
            num_keypoints: default_num_keypoints(),
            max_retries: default_max_retries(),
            cache_landmarks: true,
        }
    }
}

/// Mouth ROI alignment to the reference face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSettings {
    /// ROI width in reference pixels (even).
    #[serde(default = "default_crop_size")]
    pub crop_width: u32,

    /// ROI height in reference pixels (even).
    #[serde(default = "default_crop_size")]
    pub crop_height: u32,

    /// Keypoints used to estimate the per-frame transform.
    #[serde(default = "default_stable_points")]
    pub stable_points: Vec<usize>,

    /// Keypoints whose centroid centers the ROI.
    #[serde(default = "default_mouth_points")]
    pub mouth_points: Vec<usize>,

    /// Smallest accepted transform scale.
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,

    /// Largest accepted transform scale.
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
}

fn default_crop_size() -> u32 {
    96
}

fn default_stable_points() -> Vec<usize> {
    vec![33, 36, 39, 42, 45]
}

fn default_mouth_points() -> Vec<usize> {
    (48..68).collect()
}

fn default_min_scale() -> f64 {
    0.05
}

fn default_max_scale() -> f64 {
    20.0
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            crop_width: default_crop_size(),
            crop_height: default_crop_size(),
            stable_points: default_stable_points(),
            mouth_points: default_mouth_points(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
        }
    }
}

/// Temporal landmark smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingSettings {
    /// Moving-average window in frames.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    12
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

/// Noise corpus construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSettings {
    /// Required sample rate of noise WAV files.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Slice length in seconds.
    #[serde(default = "default_slice_secs")]
    pub slice_secs: f64,

    /// Speech slices mixed into one babble clip.
    #[serde(default = "default_babble_mix")]
    pub babble_mix: usize,

    /// Babble clips produced across all shards.
    #[serde(default = "default_babble_count")]
    pub babble_count: usize,

    /// Base seed for babble synthesis.
    #[serde(default)]
    pub seed: u64,

    /// Manifest lower duration bound in seconds (inclusive).
    #[serde(default = "default_min_secs")]
    pub min_secs: f64,

    /// Manifest upper duration bound in seconds (exclusive).
    #[serde(default = "default_max_secs")]
    pub max_secs: f64,
}

fn default_slice_secs() -> f64 {
    10.0
}

fn default_babble_mix() -> usize {
    30
}

fn default_babble_count() -> usize {
    100
}

fn default_min_secs() -> f64 {
    3.0
}

fn default_max_secs() -> f64 {
    11.0
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            slice_secs: default_slice_secs(),
            babble_mix: default_babble_mix(),
            babble_count: default_babble_count(),
            seed: 0,
            min_secs: default_min_secs(),
            max_secs: default_max_secs(),
        }
    }
}

/// Per-worker execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Clip tasks run in parallel (0 = one per core).
    #[serde(default)]
    pub threads: usize,

    /// Skip clips whose outputs already exist.
    #[serde(default = "default_true")]
    pub resume: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            resume: true,
        }
    }
}

impl Settings {
    /// Check invariants a worker relies on.
    ///
    /// Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let align = &self.alignment;
        if align.crop_width == 0 || align.crop_height == 0 {
            return Err("alignment crop size must be positive".to_string());
        }
        if align.crop_width % 2 != 0 || align.crop_height % 2 != 0 {
            return Err(format!(
                "alignment crop size must be even, got {}x{}",
                align.crop_width, align.crop_height
            ));
        }
        if align.stable_points.len() < 2 {
            return Err("alignment.stable_points needs at least 2 points".to_string());
        }
        if align.mouth_points.is_empty() {
            return Err("alignment.mouth_points is empty".to_string());
        }
        let k = self.detection.num_keypoints;
        if let Some(i) = align
            .stable_points
            .iter()
            .chain(&align.mouth_points)
            .find(|&&i| i >= k)
        {
            return Err(format!(
                "keypoint index {} out of range for {} keypoints",
                i, k
            ));
        }
        if !(align.min_scale > 0.0 && align.max_scale > align.min_scale) {
            return Err(format!(
                "alignment scale bounds must satisfy 0 < min < max, got [{}, {}]",
                align.min_scale, align.max_scale
            ));
        }
        let detection = &self.detection;
        if detection.program.trim().is_empty() {
            return Err("detection.program is empty".to_string());
        }
        for (key, path) in [
            ("face_model", &detection.face_model),
            ("landmark_model", &detection.landmark_model),
        ] {
            if !path.is_empty() && !Path::new(path).is_file() {
                return Err(format!("detection.{} '{}' does not exist", key, path));
            }
        }
        if self.smoothing.window == 0 {
            return Err("smoothing.window must be at least 1".to_string());
        }
        if self.media.audio_sample_rate == 0 || self.noise.sample_rate == 0 {
            return Err("sample rates must be positive".to_string());
        }
        if !(self.noise.slice_secs > 0.0) {
            return Err("noise.slice_secs must be positive".to_string());
        }
        if self.noise.babble_mix == 0 {
            return Err("noise.babble_mix must be at least 1".to_string());
        }
        if !(self.noise.min_secs >= 0.0 && self.noise.min_secs < self.noise.max_secs) {
            return Err(format!(
                "noise duration bounds must satisfy 0 <= min < max, got [{}, {})",
                self.noise.min_secs, self.noise.max_secs
            ));
        }
        Ok(())
    }
}
