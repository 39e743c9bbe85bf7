//! Config manager for loading, validating and saving settings.
//!
//! Key features:
//! - Atomic writes (write to a partial file, then rename)
//! - Validation on load; invalid settings are a fatal startup error
//! - Files with unknown sections or missing keys are rewritten in full

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::DocumentMut;

use super::settings::{ConfigSection, Settings};
use crate::output::write_atomic;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the worker configuration file.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Changes are only in memory until `save()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the manager and return its settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load and validate config from file.
    ///
    /// Returns error if the file doesn't exist or fails validation.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (settings, _) = parse_and_inspect(&content)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file, creating it with defaults if it doesn't exist.
    ///
    /// A file with unknown sections or keys, or missing keys, is rewritten
    /// with the effective settings.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, needs_rewrite) = parse_and_inspect(&content)?;
            settings.validate().map_err(ConfigError::Invalid)?;
            self.settings = settings;

            if needs_rewrite {
                tracing::info!(
                    "[Config] Rewriting {} with effective settings",
                    self.config_path.display()
                );
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("[Config] Created default config at {}", self.config_path.display());
        }
        Ok(())
    }

    /// Ensure all configured output directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        let dirs = [
            paths.output_dir(),
            paths.video_dir(),
            paths.audio_dir(),
            paths.landmark_dir(),
            paths.logs_dir(),
        ];

        for dir in dirs {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }

        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = generate_config_with_comments(&self.settings)?;
        write_atomic(&self.config_path, content.as_bytes())?;
        Ok(())
    }
}

/// Parse settings and report whether the file differs structurally from
/// what would be written for them (unknown or missing sections and keys).
fn parse_and_inspect(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    // Defaults fill in missing fields
    let settings: Settings = toml::from_str(content)?;

    let expected: DocumentMut = toml::to_string(&settings)?.parse()?;
    let mut needs_rewrite = false;

    for (section, _) in doc.iter() {
        if expected.get(section).is_none() {
            tracing::warn!("[Config] Unknown section [{}]", section);
            needs_rewrite = true;
        }
    }

    for (section, item) in expected.iter() {
        let Some(expected_table) = item.as_table() else {
            continue;
        };
        match doc.get(section).and_then(|i| i.as_table()) {
            None => needs_rewrite = true,
            Some(table) => {
                let missing = expected_table.iter().any(|(key, _)| !table.contains_key(key));
                let unknown = table.iter().any(|(key, _)| !expected_table.contains_key(key));
                if unknown {
                    tracing::warn!("[Config] Unknown keys in [{}]", section);
                }
                needs_rewrite |= missing || unknown;
            }
        }
    }

    Ok((settings, needs_rewrite))
}

/// Generate config content with a comment above each section.
fn generate_config_with_comments(settings: &Settings) -> ConfigResult<String> {
    let mut output = String::new();

    output.push_str("# avprep configuration\n");
    output.push_str("# Missing keys are filled with defaults when the file is loaded.\n\n");

    for (i, section) in ConfigSection::ALL.iter().enumerate() {
        let body = match section {
            ConfigSection::Paths => toml::to_string_pretty(&settings.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&settings.logging)?,
            ConfigSection::Media => toml::to_string_pretty(&settings.media)?,
            ConfigSection::Detection => toml::to_string_pretty(&settings.detection)?,
            ConfigSection::Alignment => toml::to_string_pretty(&settings.alignment)?,
            ConfigSection::Smoothing => toml::to_string_pretty(&settings.smoothing)?,
            ConfigSection::Noise => toml::to_string_pretty(&settings.noise)?,
            ConfigSection::Workers => toml::to_string_pretty(&settings.workers)?,
        };

        if i > 0 {
            output.push('\n');
        }
        output.push_str(&format!("# {}\n", section.comment()));
        output.push_str(&format!("[{}]\n", section.table_name()));
        for line in body.lines() {
            output.push_str(line);
            output.push('\n');
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("conf").join("avprep.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        for section in ConfigSection::ALL {
            assert!(content.contains(&format!("[{}]", section.table_name())));
        }
    }

    #[test]
    fn generated_file_loads_back_unchanged() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("avprep.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.settings_mut().smoothing.window = 7;
        manager.save().unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        let (settings, needs_rewrite) = parse_and_inspect(&content).unwrap();
        assert!(!needs_rewrite);
        assert_eq!(settings.smoothing.window, 7);
    }

    #[test]
    fn load_or_create_preserves_and_completes_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("avprep.toml");
        fs::write(&config_path, "[paths]\nvideo_dir = \"crops\"\n[legacy]\nx = 1\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        assert_eq!(manager.settings().paths.video_dir, "crops");

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("video_dir = \"crops\""));
        assert!(content.contains("[smoothing]"));
        assert!(!content.contains("[legacy]"));
    }

    #[test]
    fn load_requires_existing_file() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("missing.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_rejects_invalid_settings() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("avprep.toml");
        fs::write(&config_path, "[alignment]\ncrop_width = 95\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        assert!(matches!(manager.load(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn atomic_write_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("avprep.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| crate::output::is_partial(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }
}
