use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handle::{AudioHandle, HandleRegistry};

pub const SETTING_MIN: f32 = 0.5;
pub const SETTING_MAX: f32 = 2.0;

// handle is minted per session and never stored
#[derive(Debug, Clone)]
pub struct VoiceSample {
    pub id: Uuid,
    pub name: String,
    pub duration_seconds: u32,
    pub created_date: String,
    pub handle: AudioHandle,
    pub audio_bytes: Arc<[u8]>,
}

impl VoiceSample {
    pub fn new(
        name: String,
        duration_seconds: u32,
        audio_bytes: Arc<[u8]>,
        handles: &HandleRegistry,
    ) -> Self {
        Self::restore(
            Uuid::new_v4(),
            name,
            duration_seconds,
            today(),
            audio_bytes,
            handles,
        )
    }

    pub fn restore(
        id: Uuid,
        name: String,
        duration_seconds: u32,
        created_date: String,
        audio_bytes: Arc<[u8]>,
        handles: &HandleRegistry,
    ) -> Self {
        let handle = handles.create(audio_bytes.clone());
        Self {
            id,
            name,
            duration_seconds,
            created_date,
            handle,
            audio_bytes,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

pub fn sample_name(collection_len: usize) -> String {
    format!("Sample {}", collection_len + 1)
}

fn today() -> String {
    chrono::Local::now().format("%-m/%-d/%Y").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub speed: f32,
    pub pitch: f32,
    // Not sent to the server yet
    pub emphasis: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            emphasis: 1.0,
        }
    }
}

impl GenerationSettings {
    pub fn new(speed: f32, pitch: f32, emphasis: f32) -> Self {
        Self {
            speed: snap(speed),
            pitch: snap(pitch),
            emphasis: snap(emphasis),
        }
    }

    pub fn with_speed(self, speed: f32) -> Self {
        Self { speed: snap(speed), ..self }
    }

    pub fn with_pitch(self, pitch: f32) -> Self {
        Self { pitch: snap(pitch), ..self }
    }

    pub fn with_emphasis(self, emphasis: f32) -> Self {
        Self { emphasis: snap(emphasis), ..self }
    }
}

fn snap(value: f32) -> f32 {
    if !value.is_finite() {
        return 1.0;
    }
    (value.clamp(SETTING_MIN, SETTING_MAX) * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub base_url: String,
    pub port: String,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            port: "5000".to_string(),
        }
    }
}

impl ServerEndpoint {
    pub fn new(base_url: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            port: port.into(),
        }
    }

    pub fn origin(&self) -> String {
        format!("{}:{}", self.base_url, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}
