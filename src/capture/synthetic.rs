use super::{CaptureSource, FrameCallback};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::frame::{MediaType, PixelFormat, RawFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Audio buffer size: 10 ms of 48 kHz stereo 16-bit PCM
const AUDIO_BUFFER_BYTES: usize = 1920;

/// Generates moving BGRA gradients on a dedicated thread, standing in for a platform
/// screen capture facility
pub struct SyntheticCaptureSource {
    width: u32,
    height: u32,
    fps: u32,
    audio_every: u32,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SyntheticCaptureSource {
    pub fn new(width: u32, height: u32, fps: u32, audio_every: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            audio_every,
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.width, config.height, config.fps, config.audio_every)
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn render(width: u32, height: u32, phase: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        let shift = (phase % 256) as u32;
        for y in 0..height {
            for x in 0..width {
                let b = ((x * 255 / width.max(1)) + shift) % 256;
                let g = ((y * 255 / height.max(1)) + shift) % 256;
                let r = (shift * 2) % 256;
                data.extend_from_slice(&[b as u8, g as u8, r as u8, 0xFF]);
            }
        }
        data
    }

    fn run(
        width: u32,
        height: u32,
        fps: u32,
        audio_every: u32,
        running: Arc<AtomicBool>,
        callback: FrameCallback,
    ) {
        let frame_interval = Duration::from_secs_f64(1.0 / fps as f64);
        let epoch = Instant::now();
        let mut sequence: u64 = 0;
        let mut next_deadline = epoch;

        while running.load(Ordering::Acquire) {
            let captured_at = epoch.elapsed();
            let data = Self::render(width, height, sequence);
            callback(RawFrame::video(
                sequence,
                captured_at,
                data,
                width,
                height,
                PixelFormat::Bgra32,
            ));

            if audio_every > 0 && sequence % audio_every as u64 == 0 {
                sequence += 1;
                callback(RawFrame::audio(
                    sequence,
                    captured_at,
                    vec![0u8; AUDIO_BUFFER_BYTES],
                    MediaType::AppAudio,
                ));
            }
            sequence += 1;

            next_deadline += frame_interval;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                next_deadline = now;
            }
        }

        debug!("Synthetic capture thread exiting after {} buffers", sequence);
    }
}

#[async_trait]
impl CaptureSource for SyntheticCaptureSource {
    fn is_authorized(&self) -> bool {
        true
    }

    async fn start_delivering(&self, callback: FrameCallback) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(CaptureError::StartFailed {
                details: "synthetic source already delivering".to_string(),
            });
        }

        let running = Arc::new(AtomicBool::new(true));
        let (width, height, fps, audio_every) = (self.width, self.height, self.fps, self.audio_every);
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("synthetic-capture".to_string())
            .spawn(move || Self::run(width, height, fps, audio_every, thread_running, callback))
            .map_err(|e| CaptureError::StartFailed {
                details: e.to_string(),
            })?;

        info!(
            "Synthetic capture started: {}x{} @ {} fps",
            self.width, self.height, self.fps
        );
        *worker = Some(Worker { running, handle });
        Ok(())
    }

    async fn stop_delivering(&self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        worker.running.store(false, Ordering::Release);
        let joined = tokio::task::spawn_blocking(move || worker.handle.join())
            .await
            .map_err(|e| CaptureError::StopFailed {
                details: e.to_string(),
            })?;

        if joined.is_err() {
            warn!("Synthetic capture thread panicked");
            return Err(CaptureError::StopFailed {
                details: "capture thread panicked".to_string(),
            });
        }

        info!("Synthetic capture stopped");
        Ok(())
    }
}

impl Drop for SyntheticCaptureSource {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.running.store(false, Ordering::Release);
        }
    }
}
