//! Configuration file handling for doccam.
//!
//! Loads configuration from `<config dir>/doccam/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{CameraSettings, DevicePosition, Resolution, DEFAULT_TRIGGER_APPEAR_DELAY};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub editor: EditorConfig,
}

#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub position: DevicePosition,
    /// Seconds before the manual trigger appears (<0 never, 0 immediately)
    #[serde(default = "default_trigger_delay")]
    pub trigger_appear_delay: f64,
    /// Preview resolution as `WIDTHxHEIGHT`
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_true")]
    pub mirror_front: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: DevicePosition::default(),
            trigger_appear_delay: default_trigger_delay(),
            resolution: None,
            fps: default_fps(),
            mirror_front: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EditorConfig {
    /// Text behind the editor's help button; no button when absent
    #[serde(default)]
    pub help_message: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_fps() -> u32 {
    30
}

fn default_trigger_delay() -> f64 {
    DEFAULT_TRIGGER_APPEAR_DELAY
}

impl CameraConfig {
    /// Session settings described by this section.
    pub fn settings(&self) -> Result<CameraSettings, ConfigError> {
        let resolution = match &self.resolution {
            Some(s) => {
                Resolution::parse(s).ok_or_else(|| ConfigError::InvalidResolution(s.clone()))?
            }
            None => Resolution::default(),
        };
        Ok(CameraSettings {
            initial_position: self.position,
            resolution,
            fps: self.fps,
            mirror_front: self.mirror_front,
            trigger_appear_delay: self.trigger_appear_delay,
        })
    }
}

impl Config {
    /// Load configuration from a file path, or the default path when `None`.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid resolution '{0}', expected WIDTHxHEIGHT")]
    InvalidResolution(String),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("doccam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/doccam/config.toml")
        })
}

/// Contents written by `doccam config init`.
pub const DEFAULT_CONFIG: &str = r#"# doccam configuration

[camera]
# Camera used on startup: "front" or "back"
position = "back"
# Seconds before the capture trigger appears (-1 = never, 0 = immediately)
trigger_appear_delay = 5.0
# Preview resolution
resolution = "640x480"
# Target frame rate
fps = 30
# Mirror the front camera preview (selfie mode)
mirror_front = true

[editor]
# Message behind the editor's help button (remove to hide the button)
help_message = "Rotate until the document reads upright, then confirm."
"#;
