use log::{debug, error, info};
use reqwest::multipart::{Form, Part};
use shared::{GenerationSettings, ServerEndpoint, StudioError, StudioResult, VoiceSample};

pub const PREVIEW_MAX_CHARS: usize = 100;
pub const ELLIPSIS: &str = "...";

pub const MISSING_TEXT: &str = "Please enter some text to generate speech";
pub const MISSING_SAMPLES: &str = "Please record at least one voice sample";

pub fn check_request(samples: &[VoiceSample], text: &str) -> StudioResult<()> {
    if text.trim().is_empty() {
        return Err(StudioError::InvalidInput(MISSING_TEXT.to_string()));
    }
    if samples.is_empty() {
        return Err(StudioError::InvalidInput(MISSING_SAMPLES.to_string()));
    }
    Ok(())
}

pub fn preview_text(text: &str) -> String {
    const TERMINATORS: [char; 3] = ['.', '!', '?'];

    // Without a sentence boundary the raw text is used as is
    let first_sentence = if text.contains(TERMINATORS) {
        text.split(TERMINATORS)
            .map(str::trim)
            .find(|segment| !segment.is_empty())
    } else {
        Some(text)
    };

    match first_sentence {
        Some(sentence) if sentence.chars().count() > PREVIEW_MAX_CHARS => {
            let mut truncated: String = sentence.chars().take(PREVIEW_MAX_CHARS).collect();
            truncated.push_str(ELLIPSIS);
            truncated
        }
        Some(sentence) => sentence.to_string(),
        None => text.chars().take(PREVIEW_MAX_CHARS).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisClient {
    http: reqwest::Client,
    endpoint: ServerEndpoint,
}

impl SynthesisClient {
    pub fn new(endpoint: ServerEndpoint) -> StudioResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StudioError::generation_failed(endpoint.origin(), e))?;
        Ok(Self::with_http(endpoint, http))
    }

    pub fn with_http(endpoint: ServerEndpoint, http: reqwest::Client) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: ServerEndpoint) {
        self.endpoint = endpoint;
    }

    pub async fn generate(
        &self,
        samples: &[VoiceSample],
        text: &str,
        settings: &GenerationSettings,
    ) -> StudioResult<Vec<u8>> {
        check_request(samples, text)?;
        self.post(samples, text, settings).await
    }

    pub async fn preview_generate(
        &self,
        samples: &[VoiceSample],
        text: &str,
        settings: &GenerationSettings,
    ) -> StudioResult<Vec<u8>> {
        check_request(samples, text)?;
        let preview = preview_text(text);
        debug!("Preview text: '{}'", preview);
        self.post(samples, &preview, settings).await
    }

    async fn post(
        &self,
        samples: &[VoiceSample],
        text: &str,
        settings: &GenerationSettings,
    ) -> StudioResult<Vec<u8>> {
        let origin = self.endpoint.origin();
        let url = format!("{}/generate", origin);
        let failed = |reason: String| {
            error!("Generation via {} failed: {}", origin, reason);
            StudioError::generation_failed(origin.clone(), reason)
        };

        let mut form = Form::new();
        for (index, sample) in samples.iter().enumerate() {
            let part = Part::bytes(sample.audio_bytes.to_vec())
                .file_name(format!("sample_{}.wav", index))
                .mime_str("audio/wav")
                .map_err(|e| failed(e.to_string()))?;
            form = form.part(format!("sample_{}", index), part);
        }
        let form = form
            .text("text", text.to_string())
            .text("speed", settings.speed.to_string())
            .text("pitch", settings.pitch.to_string());

        info!("Requesting generation from {} with {} samples", url, samples.len());
        let res = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(failed(format!("server returned {}: {}", status, body)));
        }

        let bytes = res.bytes().await.map_err(|e| failed(e.to_string()))?;
        info!("Received {} bytes of generated audio", bytes.len());
        Ok(bytes.to_vec())
    }
}
