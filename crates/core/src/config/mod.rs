use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{QualityLevel, Result, SceneError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub performance: PerformanceConfig,
    pub scene: SceneConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.performance.validate()
    }
}

/// Thresholds and sampling parameters for the adaptive quality controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Frame rate at or above which the controller may step quality up.
    pub target_fps: f32,
    /// Frame rate below which the controller may step quality down.
    pub min_fps: f32,
    pub evaluation_interval_ms: u64,
    /// Number of frame durations kept for the rolling average.
    pub sample_capacity: usize,
    /// Average frame time (ms) that must be undercut before upgrading.
    pub upgrade_frame_ms: f32,
    /// Average frame time (ms) that must be exceeded before downgrading.
    pub downgrade_frame_ms: f32,
    pub auto_adjust: bool,
    pub initial_quality: QualityLevel,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            min_fps: 30.0,
            evaluation_interval_ms: 1000,
            sample_capacity: 60,
            upgrade_frame_ms: 16.0,
            downgrade_frame_ms: 33.0,
            auto_adjust: true,
            initial_quality: QualityLevel::High,
        }
    }
}

impl PerformanceConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_capacity == 0 {
            return Err(SceneError::InvalidConfig(
                "sample_capacity must be greater than zero",
            ));
        }
        if self.evaluation_interval_ms == 0 {
            return Err(SceneError::InvalidConfig(
                "evaluation_interval_ms must be greater than zero",
            ));
        }
        if self.min_fps > self.target_fps {
            return Err(SceneError::InvalidConfig(
                "min_fps must not exceed target_fps",
            ));
        }
        if self.upgrade_frame_ms > self.downgrade_frame_ms {
            return Err(SceneError::InvalidConfig(
                "upgrade_frame_ms must not exceed downgrade_frame_ms",
            ));
        }
        Ok(())
    }
}

/// Tuning for the decorative scene state driven every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub parallax_strength: f32,
    /// Exponential easing rate in 1/s. Each frame the camera closes
    /// `1 - e^(-camera_damping * dt)` of the remaining distance.
    pub camera_damping: f32,
    pub light_pulse_hz: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            parallax_strength: 0.5,
            camera_damping: 3.0,
            light_pulse_hz: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = AppConfig::from_json(r#"{ "performance": { "target_fps": 90.0 } }"#)
            .expect("config should parse");

        assert_eq!(config.performance.target_fps, 90.0);
        assert_eq!(config.performance.min_fps, 30.0);
        assert_eq!(config.performance.sample_capacity, 60);
        assert_eq!(config.performance.initial_quality, QualityLevel::High);
        assert_eq!(config.scene.parallax_strength, 0.5);
    }

    #[test]
    fn parses_quality_level_names() {
        let config =
            AppConfig::from_json(r#"{ "performance": { "initial_quality": "low" } }"#).unwrap();
        assert_eq!(config.performance.initial_quality, QualityLevel::Low);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = AppConfig::from_json(r#"{ "performance": { "min_fps": 75.0 } }"#).unwrap_err();
        assert!(matches!(err, SceneError::InvalidConfig(_)));

        let err = AppConfig::from_json(
            r#"{ "performance": { "upgrade_frame_ms": 40.0, "downgrade_frame_ms": 20.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_empty_sample_window() {
        let err =
            AppConfig::from_json(r#"{ "performance": { "sample_capacity": 0 } }"#).unwrap_err();
        assert!(format!("{err}").contains("sample_capacity"));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = AppConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SceneError::Config(_)));
    }
}
