//! Configuration for MIDI vJoy GW
//!
//! Every section and field has a default, so an empty YAML file is a valid
//! configuration.

use crate::joystick::{FeederOptions, PollSchedule, MAX_DEVICES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub joystick: JoystickConfig,
    pub storage: StorageConfig,
}

/// MIDI input selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Case-insensitive port name substrings; empty listens to every input
    pub inputs: Vec<String>,
    pub client_name: String,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            client_name: "midi-vjoy-gw".to_string(),
        }
    }
}

/// Virtual joystick devices
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JoystickConfig {
    pub device_count: u8,
    pub poll_base_ms: u64,
    pub poll_jitter_ms: u64,
    pub poll_occupied_extra_ms: u64,
    pub click_hold_ms: u64,
    /// Devices acquired on startup
    pub acquire: Vec<u8>,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            device_count: MAX_DEVICES,
            poll_base_ms: 500,
            poll_jitter_ms: 1000,
            poll_occupied_extra_ms: 1000,
            click_hold_ms: 50,
            acquire: vec![1],
        }
    }
}

impl JoystickConfig {
    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            base: Duration::from_millis(self.poll_base_ms),
            jitter: Duration::from_millis(self.poll_jitter_ms),
            occupied_extra: Duration::from_millis(self.poll_occupied_extra_ms),
        }
    }

    pub fn feeder_options(&self) -> FeederOptions {
        FeederOptions {
            click_hold: Duration::from_millis(self.click_hold_ms),
        }
    }
}

/// Command storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sled,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Overrides the default location under the state directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Load the file if present, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        // serde_yaml deserializes an empty document as unit, not an empty map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let joystick = &self.joystick;
        if joystick.device_count == 0 || joystick.device_count > MAX_DEVICES {
            anyhow::bail!(
                "joystick.device_count must be within 1..={}, got {}",
                MAX_DEVICES,
                joystick.device_count
            );
        }
        if let Some(id) = joystick
            .acquire
            .iter()
            .find(|id| **id == 0 || **id > joystick.device_count)
        {
            anyhow::bail!("joystick.acquire lists unknown device {}", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(AppConfig::parse("").unwrap(), AppConfig::default());
        assert_eq!(AppConfig::parse("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
midi:
  inputs: ["nanoKONTROL"]
joystick:
  click_hold_ms: 80
  acquire: [1, 2]
storage:
  backend: sled
"#,
        )
        .unwrap();

        assert_eq!(config.midi.inputs, vec!["nanoKONTROL"]);
        assert_eq!(config.midi.client_name, "midi-vjoy-gw");
        assert_eq!(config.joystick.device_count, 16);
        assert_eq!(
            config.joystick.feeder_options().click_hold,
            Duration::from_millis(80)
        );
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_devices() {
        assert!(AppConfig::parse("joystick:\n  device_count: 17\n").is_err());
        assert!(AppConfig::parse("joystick:\n  device_count: 2\n  acquire: [3]\n").is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.joystick.poll_base_ms = 250;
        config.storage.path = Some(dir.path().join("commands.json"));
        config.save(&path).await.unwrap();

        assert_eq!(AppConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.yaml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(AppConfig::load(dir.path().join("absent.yaml")).await.is_err());
    }
}
