// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Hub hardware behaviour
    pub hub: HubConfig,

    /// Alarm defaults
    pub alarm: AlarmConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Report streaming configuration
    pub streaming: StreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "hubalarm".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            hub: HubConfig::default(),
            alarm: AlarmConfig::default(),
            database: DatabaseConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("hubalarm"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Hub hardware configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Play a sound cue on every alarm transition (v3 hubs)
    pub voice_cues: bool,

    /// How long the alert LED runs while on battery, in seconds
    pub battery_powered_led_secs: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            voice_cues: true,
            battery_powered_led_secs: 300,
        }
    }
}

/// Alarm defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Exit delay used when an arm request names none
    pub exit_delay_secs: u32,

    /// Entrance delay used when an arm request names none
    pub entrance_delay_secs: u32,

    /// Motion sensors that must agree when an arm request names no count
    pub sensitivity_device_count: u32,

    /// Report bus capacity
    pub queue_capacity: usize,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            exit_delay_secs: 30,
            entrance_delay_secs: 30,
            sensitivity_device_count: 1,
            queue_capacity: 256,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Persist alarm state to SQLite; otherwise state lives in memory
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Incident retention period in days
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/hubalarm.db"),
            retention_days: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"

            [hub]
            voice_cues = false
        "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert!(!config.hub.voice_cues);
        assert_eq!(config.hub.battery_powered_led_secs, 300);
        assert_eq!(config.alarm, AlarmConfig::default());
        assert!(config.database.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("hubalarm-config-{}.toml", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.alarm.exit_delay_secs = 45;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.alarm.exit_delay_secs, 45);
        assert_eq!(loaded.app_name, "hubalarm");

        std::fs::remove_file(&path).unwrap();
    }
}
