//! Wires the audio subsystem's synchronous [`AudioCodec`] collaborator
//! contract to the asynchronous worker process protocol: `forward` only
//! enqueues, a background task drains the queue in order and feeds the
//! worker, matching the outbound-priority-queue split the wire writer
//! already uses between "caller enqueues" and "a task drains".

use std::collections::BTreeMap;
use std::sync::Arc;

use rdsp_subsystems::audio::{AudioCodec, AudioCodecError};
use rdsp_wire::Value;
use rdsp_worker::{WorkerControl, WorkerHandle};
use tokio::sync::mpsc;
use tracing::{error, warn};

struct AudioFrameJob {
    codec: String,
    data: Vec<u8>,
}

pub struct WorkerAudioCodec {
    sender: mpsc::Sender<AudioFrameJob>,
}

impl WorkerAudioCodec {
    /// Spawns the background task that owns `worker` and feeds it frames in
    /// the order `forward` was called, returning a collaborator handle the
    /// audio subsystem can hold without knowing the worker exists.
    pub fn spawn(mut worker: WorkerHandle, queue_depth: usize) -> Arc<Self> {
        let (sender, mut receiver) = mpsc::channel::<AudioFrameJob>(queue_depth);

        tokio::spawn(async move {
            let mut next_frame_id: u64 = 0;
            while let Some(job) = receiver.recv().await {
                let frame_id = next_frame_id;
                next_frame_id = next_frame_id.wrapping_add(1);

                let byte_len = match u32::try_from(job.data.len()) {
                    Ok(len) => len,
                    Err(_) => {
                        warn!(frame_id, bytes = job.data.len(), "audio frame too large to forward to worker");
                        continue;
                    }
                };

                tracing::trace!(frame_id, codec = %job.codec, bytes = byte_len, "forwarding audio frame to worker");
                if let Err(err) = worker.send_bulk_inline(&job.data).await {
                    error!(frame_id, error = %err, "failed to hand audio frame bytes to worker");
                    continue;
                }
                if let Err(err) = worker.send(&WorkerControl::EncodeFrame { frame_id, byte_len }).await {
                    error!(frame_id, error = %err, "failed to send encode request to worker");
                    continue;
                }
                match worker.recv().await {
                    Ok(WorkerControl::FrameReady { frame_id, .. }) => {
                        tracing::debug!(frame_id, "worker accepted audio frame");
                    }
                    Ok(WorkerControl::Error { frame_id, message }) => {
                        warn!(?frame_id, message, "worker rejected audio frame");
                    }
                    Ok(other) => {
                        warn!(?other, "unexpected worker reply to audio frame");
                    }
                    Err(err) => {
                        error!(error = %err, "worker control channel failed, audio forwarding stopped");
                        break;
                    }
                }
            }
        });

        Arc::new(Self { sender })
    }

    /// A collaborator for when the worker process couldn't be spawned at
    /// startup: every `forward` call is rejected rather than the server
    /// refusing to start over a codec it might not even need this session.
    pub fn spawn_unavailable() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<AudioFrameJob>(1);
        drop(receiver);
        Arc::new(Self { sender })
    }
}

impl AudioCodec for WorkerAudioCodec {
    fn forward(&self, codec: &str, data: &[u8], _attrs: &BTreeMap<String, Value>) -> Result<(), AudioCodecError> {
        let job = AudioFrameJob { codec: codec.to_string(), data: data.to_vec() };
        self.sender.try_send(job).map_err(|err| AudioCodecError::Rejected(err.to_string()))
    }
}
