use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::persistence::DEFAULT_SLOT;
use crate::types::{GenerationSettings, ServerEndpoint};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub voice: VoiceConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub speed: f32,
    pub pitch: f32,
    pub emphasis: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    // Host default when unset
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub slot: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let endpoint = ServerEndpoint::default();
        Self {
            url: endpoint.base_url,
            port: endpoint.port,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let settings = GenerationSettings::default();
        Self {
            speed: settings.speed,
            pitch: settings.pitch,
            emphasis: settings.emphasis,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            slot: DEFAULT_SLOT.to_string(),
        }
    }
}

impl Config {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voice-studio").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path().context("Could not find config directory")?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(&path, toml_string)?;
        Ok(path)
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new(self.server.url.clone(), self.server.port.clone())
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings::new(self.voice.speed, self.voice.pitch, self.voice.emphasis)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("voice-studio")
        })
    }
}
