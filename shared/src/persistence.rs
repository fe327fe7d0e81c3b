use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec;
use crate::error::{StudioError, StudioResult};
use crate::handle::HandleRegistry;
use crate::storage::KeyValueStore;
use crate::types::VoiceSample;

pub const DEFAULT_SLOT: &str = "voiceSamples";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSample {
    id: Uuid,
    name: String,
    duration_seconds: u32,
    created_date: String,
    encoded_bytes: String,
}

#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
    slot: String,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
        }
    }

    pub async fn save(&self, samples: &[VoiceSample]) {
        if let Err(e) = self.try_save(samples).await {
            error!("Failed to persist {} samples: {}", samples.len(), e);
        }
    }

    async fn try_save(&self, samples: &[VoiceSample]) -> StudioResult<()> {
        if samples.is_empty() {
            debug!("Sample collection empty, clearing slot '{}'", self.slot);
            return self.store.remove(&self.slot).await;
        }

        // Encode all payloads off the async thread, then wait for every one
        let encodings: Vec<JoinHandle<String>> = samples
            .iter()
            .map(|sample| {
                let bytes = sample.audio_bytes.clone();
                tokio::task::spawn_blocking(move || codec::encode(&bytes))
            })
            .collect();

        let mut records = Vec::with_capacity(samples.len());
        for (sample, encoding) in samples.iter().zip(encodings) {
            let encoded_bytes = encoding
                .await
                .map_err(|e| StudioError::Storage(format!("encoding task failed: {}", e)))?;
            records.push(StoredSample {
                id: sample.id,
                name: sample.name.clone(),
                duration_seconds: sample.duration_seconds,
                created_date: sample.created_date.clone(),
                encoded_bytes,
            });
        }

        let json = serde_json::to_string(&records)
            .map_err(|e| StudioError::Storage(format!("serialization failed: {}", e)))?;
        self.store.set(&self.slot, json).await?;
        debug!("Persisted {} samples to slot '{}'", records.len(), self.slot);
        Ok(())
    }

    // Anything unreadable fails the whole load
    pub async fn load(&self, handles: &HandleRegistry) -> StudioResult<Vec<VoiceSample>> {
        let Some(json) = self.store.get(&self.slot).await? else {
            info!("No stored samples in slot '{}'", self.slot);
            return Ok(Vec::new());
        };

        let records: Vec<StoredSample> = serde_json::from_str(&json)
            .map_err(|e| StudioError::CorruptStore(e.to_string()))?;

        let mut decoded = Vec::with_capacity(records.len());
        for record in records {
            let bytes = codec::decode(&record.encoded_bytes)?;
            decoded.push((record, bytes));
        }

        // Only mint handles once everything decoded
        let samples: Vec<VoiceSample> = decoded
            .into_iter()
            .map(|(record, bytes)| {
                VoiceSample::restore(
                    record.id,
                    record.name,
                    record.duration_seconds,
                    record.created_date,
                    Arc::from(bytes),
                    handles,
                )
            })
            .collect();

        info!("Loaded {} samples from slot '{}'", samples.len(), self.slot);
        Ok(samples)
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    generation: u64,
    samples: Arc<Vec<VoiceSample>>,
}

pub struct PersistenceWriter {
    latest: watch::Sender<Snapshot>,
    completed: watch::Receiver<u64>,
    submitted: u64,
    task: JoinHandle<()>,
}

impl PersistenceWriter {
    // Must be called from within a tokio runtime
    pub fn spawn(gateway: PersistenceGateway) -> Self {
        let (latest, mut snapshots) = watch::channel(Snapshot {
            generation: 0,
            samples: Arc::new(Vec::new()),
        });
        let (done_tx, completed) = watch::channel(0u64);

        let task = tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                gateway.save(&snapshot.samples).await;
                let _ = done_tx.send(snapshot.generation);
            }
            debug!("Persistence writer stopped");
        });

        Self {
            latest,
            completed,
            submitted: 0,
            task,
        }
    }

    pub fn submit(&mut self, samples: Arc<Vec<VoiceSample>>) {
        self.submitted += 1;
        self.latest.send_replace(Snapshot {
            generation: self.submitted,
            samples,
        });
    }

    pub async fn flush(&mut self) {
        let target = self.submitted;
        if self.completed.wait_for(|done| *done >= target).await.is_err() {
            warn!("Persistence writer exited before flushing");
        }
    }

    pub async fn shutdown(mut self) {
        self.flush().await;
        drop(self.latest);
        if let Err(e) = self.task.await {
            warn!("Persistence writer task failed: {}", e);
        }
    }
}
