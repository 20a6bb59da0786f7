//! Configuration for head-sway telemetry.

use crate::core::angles::AngleChannel;
use crate::core::engine::EngineSettings;
use crate::core::export::AlignmentPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Highest accepted processing rate.
pub const MAX_TARGET_FPS: u32 = 120;

/// Main configuration. Every field except the paths can change while a
/// session is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Processing rate in frames per second
    pub target_fps: u32,

    /// Maximum age of retained samples
    #[serde(with = "duration_serde")]
    pub retention_window: Duration,

    /// Minimum gap between variance snapshots
    #[serde(with = "duration_serde")]
    pub cadence_period: Duration,

    /// Angle channel the variance is computed over
    pub channel: AngleChannel,

    /// How exported snapshots are paired with samples
    #[serde(default)]
    pub alignment: AlignmentPolicy,

    /// Directory for CSV exports
    pub export_path: PathBuf,

    /// Directory for session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("head-sway");

        Self {
            target_fps: 15,
            retention_window: Duration::from_secs(3600),
            cadence_period: Duration::from_secs(30),
            channel: AngleChannel::Pitch,
            alignment: AlignmentPolicy::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("head-sway")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(ConfigError::Invalid(format!(
                "target_fps must be between 1 and {MAX_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }
        if self.cadence_period.is_zero() {
            return Err(ConfigError::Invalid(
                "cadence_period must be at least 1 second".to_string(),
            ));
        }
        if self.retention_window.is_zero() {
            return Err(ConfigError::Invalid(
                "retention_window must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum time between two ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.target_fps.max(1)))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            retention_window: self.retention_window,
            cadence_period: self.cadence_period,
            channel: self.channel,
            alignment: self.alignment,
        }
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
