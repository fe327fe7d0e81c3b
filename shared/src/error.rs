use thiserror::Error;

pub type StudioResult<T> = Result<T, StudioError>;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("No audio capture device available: {0}")]
    DeviceUnavailable(String),

    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Recording already active")]
    AlreadyRecording,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Generation request to {endpoint} failed: {reason}")]
    GenerationFailed { endpoint: String, reason: String },

    #[error("Stored samples are unreadable: {0}")]
    CorruptStore(String),

    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No generated audio available")]
    NoGeneratedAudio,

    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StudioError {
    pub fn generation_failed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        StudioError::GenerationFailed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}
