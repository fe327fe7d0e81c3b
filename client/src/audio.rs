use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use log::{debug, error, info, warn};
use shared::{sample_name, AudioChunk, HandleRegistry, StudioError, StudioResult, VoiceSample};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub trait CaptureDevice {
    fn open(&self) -> StudioResult<CaptureStream>;
}

pub trait StreamGuard {
    fn release(self: Box<Self>);
}

impl StreamGuard for cpal::Stream {
    fn release(self: Box<Self>) {
        if let Err(e) = self.pause() {
            warn!("Failed to pause capture stream: {}", e);
        }
        // Dropping the stream hands the device back
    }
}

pub struct CaptureStream {
    chunks: mpsc::UnboundedReceiver<AudioChunk>,
    guard: Option<Box<dyn StreamGuard>>,
}

impl CaptureStream {
    pub fn new(chunks: mpsc::UnboundedReceiver<AudioChunk>, guard: Box<dyn StreamGuard>) -> Self {
        Self {
            chunks,
            guard: Some(guard),
        }
    }

    fn drain_into(&mut self, buffer: &mut Vec<AudioChunk>) {
        while let Ok(chunk) = self.chunks.try_recv() {
            buffer.push(chunk);
        }
    }

    fn stop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct CpalCaptureDevice {
    device_name: Option<String>,
}

impl CpalCaptureDevice {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn find_device(&self) -> StudioResult<Device> {
        let host = cpal::default_host();

        if let Some(device_name) = &self.device_name {
            host.input_devices()
                .map_err(capture_error)?
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| {
                    StudioError::DeviceUnavailable(format!("Audio device '{}' not found", device_name))
                })
        } else {
            host.default_input_device().ok_or_else(|| {
                StudioError::DeviceUnavailable("No default input device available".to_string())
            })
        }
    }

    pub fn list_input_devices() -> StudioResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(capture_error)?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn open(&self) -> StudioResult<CaptureStream> {
        let device = self.find_device()?;
        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

        let supported_config = device.default_input_config().map_err(capture_error)?;
        let config: StreamConfig = supported_config.config();
        info!("Audio config: {:?}", config);

        let (tx, rx) = mpsc::unbounded_channel();

        let stream = match supported_config.sample_format() {
            SampleFormat::I8 => create_stream::<i8>(&device, &config, tx)?,
            SampleFormat::I16 => create_stream::<i16>(&device, &config, tx)?,
            SampleFormat::I32 => create_stream::<i32>(&device, &config, tx)?,
            SampleFormat::I64 => create_stream::<i64>(&device, &config, tx)?,
            SampleFormat::U8 => create_stream::<u8>(&device, &config, tx)?,
            SampleFormat::U16 => create_stream::<u16>(&device, &config, tx)?,
            SampleFormat::U32 => create_stream::<u32>(&device, &config, tx)?,
            SampleFormat::U64 => create_stream::<u64>(&device, &config, tx)?,
            SampleFormat::F32 => create_stream::<f32>(&device, &config, tx)?,
            SampleFormat::F64 => create_stream::<f64>(&device, &config, tx)?,
            other => {
                return Err(StudioError::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        // On failure the stream is dropped here, releasing the device
        stream.play().map_err(capture_error)?;

        Ok(CaptureStream::new(rx, Box::new(stream)))
    }
}

fn create_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tx: mpsc::UnboundedSender<AudioChunk>,
) -> StudioResult<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let f32_data: Vec<f32> = data.iter().map(|&sample| cpal::Sample::to_sample(sample)).collect();

                debug!("Captured {} audio samples", f32_data.len());

                let chunk = AudioChunk {
                    data: f32_data,
                    sample_rate,
                    channels,
                };

                if let Err(e) = tx.send(chunk) {
                    warn!("Failed to send audio chunk: {}", e);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(capture_error)
}

// cpal reports permission problems as backend-specific text
fn capture_error(err: impl std::fmt::Display) -> StudioError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        StudioError::PermissionDenied(message)
    } else {
        StudioError::DeviceUnavailable(message)
    }
}

struct ActiveCapture {
    stream: CaptureStream,
    started_at: Instant,
    chunks: Vec<AudioChunk>,
}

pub struct Recorder {
    device: Box<dyn CaptureDevice>,
    active: Option<ActiveCapture>,
}

impl Recorder {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self { device, active: None }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn begin(&mut self) -> StudioResult<()> {
        if self.active.is_some() {
            return Err(StudioError::AlreadyRecording);
        }

        let stream = self.device.open()?;
        self.active = Some(ActiveCapture {
            stream,
            started_at: Instant::now(),
            chunks: Vec::new(),
        });
        info!("Recording started");
        Ok(())
    }

    pub fn pump(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.stream.drain_into(&mut active.chunks);
        }
    }

    // Named after collection_len, so names can repeat after deletions
    pub fn end(
        &mut self,
        collection_len: usize,
        handles: &HandleRegistry,
    ) -> StudioResult<Option<VoiceSample>> {
        let Some(mut active) = self.active.take() else {
            debug!("end() called with no active recording");
            return Ok(None);
        };

        active.stream.stop();
        active.stream.drain_into(&mut active.chunks);

        let elapsed = active.started_at.elapsed();
        let duration_seconds = (elapsed.as_millis() as f64 / 1000.0).round() as u32;
        let audio_bytes = encode_wav(&active.chunks)?;

        info!(
            "Recording stopped after {:.1}s ({} chunks, {} bytes)",
            elapsed.as_secs_f64(),
            active.chunks.len(),
            audio_bytes.len()
        );

        Ok(Some(VoiceSample::new(
            sample_name(collection_len),
            duration_seconds,
            Arc::from(audio_bytes),
            handles,
        )))
    }
}

fn encode_wav(chunks: &[AudioChunk]) -> StudioResult<Vec<u8>> {
    let (sample_rate, channels) = chunks
        .first()
        .map(|c| (c.sample_rate, c.channels))
        .unwrap_or((44_100, 1));

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
        .map_err(|e| StudioError::Capture(e.to_string()))?;
    for sample in chunks.iter().flat_map(|c| c.data.iter()) {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| StudioError::Capture(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| StudioError::Capture(e.to_string()))?;
    Ok(bytes)
}
