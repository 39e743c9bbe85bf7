//! Noise corpus records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of noise a clip contributes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NoiseCategory {
    /// Environmental noise.
    #[default]
    Noise,
    /// Music.
    Music,
    /// Synthetic babble (mixed speech).
    Babble,
    /// Single-speaker speech.
    Speech,
}

impl NoiseCategory {
    /// All categories in manifest order.
    pub const ALL: [NoiseCategory; 4] = [
        NoiseCategory::Noise,
        NoiseCategory::Music,
        NoiseCategory::Babble,
        NoiseCategory::Speech,
    ];

    /// Name used in directory and manifest names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Noise => "noise",
            Self::Music => "music",
            Self::Babble => "babble",
            Self::Speech => "speech",
        }
    }

    /// Parse a category name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
    }
}

/// A produced noise clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseClip {
    /// Source corpus name (e.g. "demand", "musan").
    pub corpus: String,
    /// Derived clip id.
    pub id: String,
    /// Output WAV path.
    pub path: PathBuf,
    /// Length in samples.
    pub num_samples: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Category.
    pub category: NoiseCategory,
    /// Constituent source ids (babble only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl NoiseClip {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip() {
        for category in NoiseCategory::ALL {
            assert_eq!(NoiseCategory::parse(category.name()), Some(category));
        }
        assert_eq!(NoiseCategory::parse(" Babble "), Some(NoiseCategory::Babble));
        assert_eq!(NoiseCategory::parse("static"), None);
    }
}
