use super::{FrameCallback, PipelineStats};
use crate::encoder::FrameEncoder;
use crate::frame::RawFrame;
use crate::recorder::RecordingState;
use crate::supervisor::{ConnectionSupervisor, SendOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Moves frames from the capture callback through the encoder to the supervisor.
///
/// The callback never blocks: frames go into a small bounded queue and are dropped when it
/// is full. A single worker drains the queue in capture order.
pub struct CapturePipeline {
    frame_tx: mpsc::Sender<RawFrame>,
    stats: Arc<Mutex<PipelineStats>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CapturePipeline {
    pub fn new(
        encoder: Arc<dyn FrameEncoder>,
        supervisor: Arc<ConnectionSupervisor>,
        recording: watch::Receiver<RecordingState>,
        queue_capacity: usize,
    ) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(queue_capacity.max(1));
        let stats = Arc::new(Mutex::new(PipelineStats::default()));
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(encode_worker(
            frame_rx,
            encoder,
            supervisor,
            recording,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        Self {
            frame_tx,
            stats,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Callback to hand to a capture source
    pub fn sink(&self) -> FrameCallback {
        let frame_tx = self.frame_tx.clone();
        let stats = Arc::clone(&self.stats);

        Arc::new(move |frame: RawFrame| {
            if !frame.media.is_video() {
                stats.lock().non_video_ignored += 1;
                return;
            }

            stats.lock().frames_received += 1;
            match frame_tx.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(frame)) => {
                    stats.lock().queue_full_dropped += 1;
                    trace!("Encoder busy, frame {} dropped", frame.sequence);
                }
                Err(mpsc::error::TrySendError::Closed(frame)) => {
                    stats.lock().idle_dropped += 1;
                    debug!("Pipeline shut down, frame {} dropped", frame.sequence);
                }
            }
        })
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    /// Stop the encode worker; frames still queued are discarded
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Encode worker ended abnormally: {}", e);
            }
            info!("Capture pipeline stopped");
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn is_recording(recording: &watch::Receiver<RecordingState>) -> bool {
    *recording.borrow() == RecordingState::Recording
}

async fn encode_worker(
    mut frame_rx: mpsc::Receiver<RawFrame>,
    encoder: Arc<dyn FrameEncoder>,
    supervisor: Arc<ConnectionSupervisor>,
    recording: watch::Receiver<RecordingState>,
    stats: Arc<Mutex<PipelineStats>>,
    cancel: CancellationToken,
) {
    debug!("Encode worker started");

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frame_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if !is_recording(&recording) {
            stats.lock().idle_dropped += 1;
            trace!("Not recording, frame {} dropped", frame.sequence);
            continue;
        }

        let sequence = frame.sequence;
        let job_encoder = Arc::clone(&encoder);
        let payload = match tokio::task::spawn_blocking(move || job_encoder.encode(&frame)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                stats.lock().encode_failures += 1;
                continue;
            }
            Err(e) => {
                warn!("Encoder task for frame {} failed: {}", sequence, e);
                stats.lock().encode_failures += 1;
                continue;
            }
        };

        // Recording may have stopped while the frame was encoding
        if !is_recording(&recording) {
            stats.lock().idle_dropped += 1;
            continue;
        }

        let size = payload.len();
        match supervisor.send(payload.data).await {
            SendOutcome::Sent => {
                stats.lock().record_sent(size);
                trace!("Frame {} sent ({} bytes)", sequence, size);
            }
            SendOutcome::Dropped(reason) => {
                stats.lock().disconnected_dropped += 1;
                trace!("Frame {} dropped: {:?}", sequence, reason);
            }
        }
    }

    debug!("Encode worker exiting");
}
