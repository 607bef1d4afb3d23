use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::SceneError;

/// Discrete rendering quality. Variants are ordered from cheapest to most
/// expensive, so `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    #[default]
    High,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 3] = [Self::Low, Self::Medium, Self::High];

    /// One step cheaper. Saturates at `Low`.
    pub fn lower(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// One step richer. Saturates at `High`.
    pub fn higher(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parameter bundle the renderer should apply for this level.
    pub fn settings(self) -> QualitySettings {
        match self {
            Self::Low => QualitySettings {
                pixel_ratio: 1.0,
                shadows: false,
                shadow_map_size: 0,
                particle_count: 500,
                antialias: false,
            },
            Self::Medium => QualitySettings {
                pixel_ratio: 1.5,
                shadows: true,
                shadow_map_size: 1024,
                particle_count: 1000,
                antialias: true,
            },
            Self::High => QualitySettings {
                pixel_ratio: 2.0,
                shadows: true,
                shadow_map_size: 2048,
                particle_count: 2000,
                antialias: true,
            },
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SceneError::UnknownQuality(trimmed.to_string()))
    }
}

/// Rendering-cost knobs selected by a [`QualityLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Multiplier applied to the device pixel density.
    pub pixel_ratio: f32,
    pub shadows: bool,
    /// Shadow map edge length in texels; zero when shadows are off.
    pub shadow_map_size: u32,
    pub particle_count: u32,
    pub antialias: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_never_skip_a_level() {
        assert_eq!(QualityLevel::High.lower(), QualityLevel::Medium);
        assert_eq!(QualityLevel::Medium.lower(), QualityLevel::Low);
        assert_eq!(QualityLevel::Low.lower(), QualityLevel::Low);

        assert_eq!(QualityLevel::Low.higher(), QualityLevel::Medium);
        assert_eq!(QualityLevel::Medium.higher(), QualityLevel::High);
        assert_eq!(QualityLevel::High.higher(), QualityLevel::High);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("HIGH".parse::<QualityLevel>().unwrap(), QualityLevel::High);
        assert_eq!(" medium ".parse::<QualityLevel>().unwrap(), QualityLevel::Medium);

        let err = "ultra".parse::<QualityLevel>().unwrap_err();
        assert!(matches!(err, SceneError::UnknownQuality(name) if name == "ultra"));
    }

    #[test]
    fn defaults_to_the_richest_level() {
        assert_eq!(QualityLevel::default(), QualityLevel::High);
    }

    #[test]
    fn richer_levels_cost_more() {
        let [low, medium, high] = QualityLevel::ALL.map(QualityLevel::settings);

        assert!(low.particle_count < medium.particle_count);
        assert!(medium.particle_count < high.particle_count);
        assert!(low.pixel_ratio < high.pixel_ratio);
        assert!(!low.shadows && low.shadow_map_size == 0);
        assert!(high.shadows && high.antialias);
    }
}
