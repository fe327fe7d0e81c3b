use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use shared::{StudioError, StudioResult};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Sample,
    Result,
    Preview,
}

impl ChannelId {
    pub const ALL: [ChannelId; 3] = [ChannelId::Sample, ChannelId::Result, ChannelId::Preview];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Sample(Uuid),
    Generation,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
    // Only the sample channel pauses; the others stop
    Paused,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub state: TransportState,
    pub source: Option<SourceId>,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            state: TransportState::Idle,
            source: None,
            position_seconds: 0.0,
            duration_seconds: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged {
        channel: ChannelId,
        source: SourceId,
        state: TransportState,
    },
    Progress {
        channel: ChannelId,
        position_seconds: f64,
        duration_seconds: f64,
    },
    Ended {
        channel: ChannelId,
        source: SourceId,
    },
}

// Unknown durations come back as NaN or infinity
pub trait OutputBackend {
    fn start(&mut self, channel: ChannelId, audio: Arc<[u8]>) -> StudioResult<()>;
    fn pause(&mut self, channel: ChannelId);
    fn stop(&mut self, channel: ChannelId);
    fn position(&self, channel: ChannelId) -> f64;
    fn duration(&self, channel: ChannelId) -> f64;
    fn is_finished(&self, channel: ChannelId) -> bool;
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub struct PlaybackController {
    backend: Box<dyn OutputBackend>,
    channels: HashMap<ChannelId, ChannelStatus>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        let (events, _) = broadcast::channel(64);
        let channels = ChannelId::ALL
            .iter()
            .map(|&id| (id, ChannelStatus::default()))
            .collect();
        Self {
            backend,
            channels,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn status(&self, channel: ChannelId) -> ChannelStatus {
        self.channels.get(&channel).cloned().unwrap_or_default()
    }

    pub fn playing(&self, channel: ChannelId) -> Option<SourceId> {
        self.channels
            .get(&channel)
            .filter(|status| status.state == TransportState::Playing)
            .and_then(|status| status.source)
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn channel_mut(&mut self, channel: ChannelId) -> &mut ChannelStatus {
        self.channels.entry(channel).or_default()
    }

    fn reset(&mut self, channel: ChannelId) -> Option<SourceId> {
        let status = self.channel_mut(channel);
        let previous = status.source.take().filter(|_| status.state != TransportState::Idle);
        *status = ChannelStatus::default();
        previous
    }

    pub fn play(&mut self, channel: ChannelId, source: SourceId, audio: Arc<[u8]>) -> StudioResult<()> {
        self.stop_all(channel);

        self.backend.start(channel, audio)?;

        let duration_seconds = finite_or_zero(self.backend.duration(channel));
        let status = self.channel_mut(channel);
        status.state = TransportState::Playing;
        status.source = Some(source);
        status.position_seconds = 0.0;
        status.duration_seconds = duration_seconds;

        info!("{:?} channel playing {:?}", channel, source);
        self.emit(PlaybackEvent::StateChanged {
            channel,
            source,
            state: TransportState::Playing,
        });
        Ok(())
    }

    pub fn toggle_play_pause(
        &mut self,
        channel: ChannelId,
        source: SourceId,
        audio: Arc<[u8]>,
    ) -> StudioResult<()> {
        if self.playing(channel) != Some(source) {
            return self.play(channel, source, audio);
        }

        if channel == ChannelId::Sample {
            self.backend.pause(channel);
            let position = finite_or_zero(self.backend.position(channel));
            let status = self.channel_mut(channel);
            status.state = TransportState::Paused;
            status.position_seconds = position;
            debug!("{:?} channel paused {:?}", channel, source);
            self.emit(PlaybackEvent::StateChanged {
                channel,
                source,
                state: TransportState::Paused,
            });
        } else {
            self.stop_all(channel);
        }
        Ok(())
    }

    pub fn stop_all(&mut self, channel: ChannelId) {
        self.backend.stop(channel);
        if let Some(previous) = self.reset(channel) {
            debug!("{:?} channel stopped {:?}", channel, previous);
            self.emit(PlaybackEvent::StateChanged {
                channel,
                source: previous,
                state: TransportState::Idle,
            });
        }
    }

    pub fn tick(&mut self) {
        for channel in ChannelId::ALL {
            let Some(source) = self.playing(channel) else {
                continue;
            };

            if self.backend.is_finished(channel) {
                self.backend.stop(channel);
                self.reset(channel);
                info!("{:?} channel finished {:?}", channel, source);
                self.emit(PlaybackEvent::Ended { channel, source });
                self.emit(PlaybackEvent::StateChanged {
                    channel,
                    source,
                    state: TransportState::Idle,
                });
                continue;
            }

            let position_seconds = finite_or_zero(self.backend.position(channel));
            let duration_seconds = finite_or_zero(self.backend.duration(channel));
            let status = self.channel_mut(channel);
            status.position_seconds = position_seconds;
            status.duration_seconds = duration_seconds;
            self.emit(PlaybackEvent::Progress {
                channel,
                position_seconds,
                duration_seconds,
            });
        }
    }
}

struct ChannelSink {
    sink: Sink,
    total: Option<Duration>,
    resumed_at: Option<Instant>,
    played: Duration,
}

impl ChannelSink {
    fn position(&self) -> Duration {
        self.played + self.resumed_at.map(|at| at.elapsed()).unwrap_or_default()
    }
}

pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sinks: HashMap<ChannelId, ChannelSink>,
}

impl RodioOutput {
    pub fn new() -> StudioResult<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| StudioError::Playback(e.to_string()))?;
        info!("Audio output ready");
        Ok(Self {
            _stream: stream,
            handle,
            sinks: HashMap::new(),
        })
    }
}

impl OutputBackend for RodioOutput {
    fn start(&mut self, channel: ChannelId, audio: Arc<[u8]>) -> StudioResult<()> {
        self.stop(channel);

        let source = Decoder::new(Cursor::new(audio))
            .map_err(|e| StudioError::Playback(format!("Decode failed: {}", e)))?;
        let total = source.total_duration();
        let sink = Sink::try_new(&self.handle).map_err(|e| StudioError::Playback(e.to_string()))?;
        sink.append(source);

        self.sinks.insert(
            channel,
            ChannelSink {
                sink,
                total,
                resumed_at: Some(Instant::now()),
                played: Duration::ZERO,
            },
        );
        Ok(())
    }

    fn pause(&mut self, channel: ChannelId) {
        if let Some(entry) = self.sinks.get_mut(&channel) {
            entry.sink.pause();
            if let Some(at) = entry.resumed_at.take() {
                entry.played += at.elapsed();
            }
        }
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(entry) = self.sinks.remove(&channel) {
            entry.sink.stop();
        }
    }

    fn position(&self, channel: ChannelId) -> f64 {
        self.sinks
            .get(&channel)
            .map(|entry| entry.position().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self, channel: ChannelId) -> f64 {
        match self.sinks.get(&channel).and_then(|entry| entry.total) {
            Some(total) => total.as_secs_f64(),
            None => f64::NAN,
        }
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        match self.sinks.get(&channel) {
            Some(entry) => entry.sink.empty(),
            None => {
                warn!("Finished check on {:?} channel with no sink", channel);
                true
            }
        }
    }
}
