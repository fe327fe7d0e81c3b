use log::{debug, error, info, warn};
use shared::{
    AudioHandle, GenerationSettings, HandleRegistry, KeyValueStore, PersistenceGateway, PersistenceWriter,
    ServerEndpoint, StudioError, StudioResult, VoiceSample,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::audio::{CaptureDevice, Recorder};
use crate::playback::{
    ChannelId, ChannelStatus, OutputBackend, PlaybackController, PlaybackEvent, SourceId,
};
use crate::synthesis::{check_request, SynthesisClient};

pub const EXPORT_FILE_NAME: &str = "generated-speech.wav";

// Unread notices beyond this are dropped
pub const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Error(String),
}

#[derive(Debug)]
enum SessionMessage {
    GenerationFinished(StudioResult<Vec<u8>>),
    PreviewFinished(StudioResult<Vec<u8>>),
}

// is_generating/is_previewing stay set until the request's result is processed
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub is_recording: bool,
    pub is_generating: bool,
    pub is_previewing: bool,
    pub settings: GenerationSettings,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Arc<[u8]>,
    pub handle: AudioHandle,
}

pub struct SessionParts {
    pub capture: Box<dyn CaptureDevice>,
    pub output: Box<dyn OutputBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub slot: String,
    pub synthesis: SynthesisClient,
    pub settings: GenerationSettings,
}

pub struct Session {
    context: SessionContext,
    samples: Arc<Vec<VoiceSample>>,
    handles: HandleRegistry,
    recorder: Recorder,
    playback: PlaybackController,
    synthesis: SynthesisClient,
    writer: PersistenceWriter,
    generation: Option<Artifact>,
    preview: Option<Artifact>,
    tx: mpsc::UnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    notices: mpsc::Sender<Notice>,
    notice_rx: Option<mpsc::Receiver<Notice>>,
}

impl Session {
    pub async fn start(parts: SessionParts) -> Self {
        let (notices, notice_rx) = mpsc::channel(NOTICE_CAPACITY);
        let handles = HandleRegistry::new();
        let gateway = PersistenceGateway::new(parts.store, parts.slot);

        let samples = match gateway.load(&handles).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Starting with no samples: {}", e);
                if matches!(e, StudioError::CorruptStore(_)) {
                    let _ = notices.try_send(Notice::Error("Saved samples could not be read".to_string()));
                }
                Vec::new()
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            context: SessionContext {
                settings: parts.settings,
                ..Default::default()
            },
            samples: Arc::new(samples),
            handles,
            recorder: Recorder::new(parts.capture),
            playback: PlaybackController::new(parts.output),
            synthesis: parts.synthesis,
            writer: PersistenceWriter::spawn(gateway),
            generation: None,
            preview: None,
            tx,
            rx,
            notices,
            notice_rx: Some(notice_rx),
        }
    }

    pub fn take_notices(&mut self) -> Option<mpsc::Receiver<Notice>> {
        self.notice_rx.take()
    }

    fn notify(&self, notice: Notice) {
        match self.notices.try_send(notice) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(notice)) => debug!("Notice queue full, dropping {:?}", notice),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn samples(&self) -> Arc<Vec<VoiceSample>> {
        self.samples.clone()
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn settings(&self) -> GenerationSettings {
        self.context.settings
    }

    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.context.settings = settings;
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        self.synthesis.endpoint()
    }

    pub fn set_endpoint(&mut self, endpoint: ServerEndpoint) {
        info!("Synthesis endpoint set to {}", endpoint.origin());
        self.synthesis.set_endpoint(endpoint);
    }

    pub fn channel(&self, channel: ChannelId) -> ChannelStatus {
        self.playback.status(channel)
    }

    pub fn subscribe_playback(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.playback.subscribe()
    }

    pub fn is_sample_playing(&self, id: Uuid) -> bool {
        self.playback.playing(ChannelId::Sample) == Some(SourceId::Sample(id))
    }

    pub fn generation(&self) -> Option<&Artifact> {
        self.generation.as_ref()
    }

    pub fn preview(&self) -> Option<&Artifact> {
        self.preview.as_ref()
    }

    fn replace_samples(&mut self, samples: Vec<VoiceSample>) {
        self.samples = Arc::new(samples);
        self.writer.submit(self.samples.clone());
    }

    pub fn toggle_recording(&mut self) -> StudioResult<()> {
        if self.context.is_recording {
            self.stop_recording().map(|_| ())
        } else {
            self.start_recording()
        }
    }

    pub fn start_recording(&mut self) -> StudioResult<()> {
        if self.context.is_recording {
            return Err(StudioError::AlreadyRecording);
        }

        match self.recorder.begin() {
            Ok(()) => {
                self.context.is_recording = true;
                self.notify(Notice::Info("Recording started".to_string()));
                Ok(())
            }
            Err(e) => {
                error!("Error accessing microphone: {}", e);
                self.notify(Notice::Error(format!("Could not access microphone: {}", e)));
                Err(e)
            }
        }
    }

    pub fn stop_recording(&mut self) -> StudioResult<Option<Uuid>> {
        if !self.context.is_recording {
            return Ok(None);
        }
        self.context.is_recording = false;

        let sample = match self.recorder.end(self.samples.len(), &self.handles) {
            Ok(Some(sample)) => sample,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.notify(Notice::Error(format!("Recording failed: {}", e)));
                return Err(e);
            }
        };

        let id = sample.id;
        let mut samples = self.samples.as_ref().clone();
        samples.push(sample);
        self.replace_samples(samples);
        self.notify(Notice::Info("Recording stopped".to_string()));
        Ok(Some(id))
    }

    fn find_sample(&self, id: Uuid) -> StudioResult<&VoiceSample> {
        self.samples
            .iter()
            .find(|sample| sample.id == id)
            .ok_or_else(|| StudioError::UnknownSample(id.to_string()))
    }

    fn resolve(&self, handle: &AudioHandle) -> StudioResult<Arc<[u8]>> {
        self.handles
            .resolve(handle)
            .ok_or_else(|| StudioError::Playback(format!("{} was released", handle)))
    }

    pub fn toggle_sample(&mut self, id: Uuid) -> StudioResult<()> {
        let sample = self.find_sample(id)?;
        let audio = self.resolve(&sample.handle)?;
        self.playback
            .toggle_play_pause(ChannelId::Sample, SourceId::Sample(id), audio)
    }

    pub fn delete_sample(&mut self, id: Uuid) -> StudioResult<()> {
        let handle = self.find_sample(id)?.handle.clone();

        if self.playback.status(ChannelId::Sample).source == Some(SourceId::Sample(id)) {
            self.playback.stop_all(ChannelId::Sample);
        }
        self.handles.release(&handle);

        let remaining = self
            .samples
            .iter()
            .filter(|sample| sample.id != id)
            .cloned()
            .collect();
        self.replace_samples(remaining);
        info!("Deleted sample {}", id);
        self.notify(Notice::Info("Sample deleted".to_string()));
        Ok(())
    }

    pub fn rename_sample(&mut self, id: Uuid, name: &str) -> StudioResult<()> {
        self.find_sample(id)?;
        let renamed = self
            .samples
            .iter()
            .cloned()
            .map(|mut sample| {
                if sample.id == id {
                    sample.rename(name);
                }
                sample
            })
            .collect();
        self.replace_samples(renamed);
        Ok(())
    }

    fn check_or_notify(&self, text: &str) -> StudioResult<()> {
        check_request(&self.samples, text).map_err(|e| {
            self.notify(Notice::Error(e.to_string()));
            e
        })
    }

    pub fn request_generation(&mut self, text: &str) -> StudioResult<bool> {
        self.check_or_notify(text)?;
        if self.context.is_generating {
            warn!("Generation already in progress");
            return Ok(false);
        }
        self.context.is_generating = true;

        let client = self.synthesis.clone();
        let samples = self.samples.clone();
        let text = text.to_string();
        let settings = self.context.settings;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.generate(&samples, &text, &settings).await;
            let _ = tx.send(SessionMessage::GenerationFinished(result));
        });
        Ok(true)
    }

    pub fn request_preview(&mut self, text: &str) -> StudioResult<bool> {
        self.check_or_notify(text)?;
        if self.context.is_previewing {
            warn!("Preview already in progress");
            return Ok(false);
        }
        self.context.is_previewing = true;

        let client = self.synthesis.clone();
        let samples = self.samples.clone();
        let text = text.to_string();
        let settings = self.context.settings;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.preview_generate(&samples, &text, &settings).await;
            let _ = tx.send(SessionMessage::PreviewFinished(result));
        });
        Ok(true)
    }

    pub fn has_outstanding_requests(&self) -> bool {
        self.context.is_generating || self.context.is_previewing
    }

    pub fn process_messages(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
        }
    }

    pub async fn settle(&mut self) {
        while self.has_outstanding_requests() {
            match self.rx.recv().await {
                Some(message) => self.handle_message(message),
                None => break,
            }
        }
    }

    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::GenerationFinished(result) => {
                self.context.is_generating = false;
                match result {
                    Ok(bytes) => {
                        self.playback.stop_all(ChannelId::Result);
                        let artifact = self.make_artifact(bytes);
                        if let Some(old) = self.generation.replace(artifact) {
                            self.handles.release(&old.handle);
                        }
                        self.notify(Notice::Info("Speech generated successfully".to_string()));
                    }
                    Err(e) => {
                        error!("Error generating speech: {}", e);
                        self.notify(Notice::Error(
                            "Failed to generate speech. Is the TTS server running?".to_string(),
                        ));
                    }
                }
            }
            SessionMessage::PreviewFinished(result) => {
                self.context.is_previewing = false;
                match result {
                    Ok(bytes) => {
                        let artifact = self.make_artifact(bytes);
                        let handle = artifact.handle.clone();
                        // Replacing the preview stops whatever preview was playing
                        self.playback.stop_all(ChannelId::Preview);
                        if let Some(old) = self.preview.replace(artifact) {
                            self.handles.release(&old.handle);
                        }
                        let played = self
                            .resolve(&handle)
                            .and_then(|audio| self.playback.play(ChannelId::Preview, SourceId::Preview, audio));
                        if let Err(e) = played {
                            self.notify(Notice::Error(format!("Could not play preview: {}", e)));
                        } else {
                            self.notify(Notice::Info("Preview ready".to_string()));
                        }
                    }
                    Err(e) => {
                        error!("Error generating preview: {}", e);
                        self.notify(Notice::Error(
                            "Failed to generate preview. Is the TTS server running?".to_string(),
                        ));
                    }
                }
            }
        }
    }

    fn make_artifact(&self, bytes: Vec<u8>) -> Artifact {
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let handle = self.handles.create(bytes.clone());
        Artifact { bytes, handle }
    }

    pub fn toggle_generation(&mut self) -> StudioResult<()> {
        let artifact = self.generation.as_ref().ok_or(StudioError::NoGeneratedAudio)?;
        let audio = self.resolve(&artifact.handle)?;
        self.playback
            .toggle_play_pause(ChannelId::Result, SourceId::Generation, audio)
    }

    pub async fn export_generation(&self, dir: &Path) -> StudioResult<PathBuf> {
        let artifact = self.generation.as_ref().ok_or(StudioError::NoGeneratedAudio)?;
        let path = dir.join(EXPORT_FILE_NAME);
        tokio::fs::write(&path, &artifact.bytes[..]).await?;
        info!("Exported generated speech to {}", path.display());
        Ok(path)
    }

    pub fn tick(&mut self) {
        self.recorder.pump();
        self.playback.tick();
        self.process_messages();
    }

    pub async fn flush(&mut self) {
        self.writer.flush().await;
    }

    pub async fn shutdown(mut self) {
        if self.context.is_recording {
            if let Err(e) = self.stop_recording() {
                warn!("Recording lost on shutdown: {}", e);
            }
        }
        for channel in ChannelId::ALL {
            self.playback.stop_all(channel);
        }
        self.writer.shutdown().await;
    }
}
