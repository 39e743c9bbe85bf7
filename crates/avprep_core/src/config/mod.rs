//! Configuration management for avprep workers.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to a partial file, then rename)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use avprep_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("avprep.toml");
//! config.load_or_create().unwrap();
//! println!("Crops go to: {}", config.settings().paths.video_dir);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AlignmentSettings, ConfigSection, DetectionSettings, LoggingSettings, MediaSettings,
    NoiseSettings, PathSettings, Settings, SmoothingSettings, WorkerSettings,
};
