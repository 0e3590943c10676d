use super::{CaptureSource, FrameCallback};
use crate::error::CaptureError;
use crate::frame::RawFrame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Capture source driven by the test: frames are delivered with `deliver`
pub struct MockCaptureSource {
    authorized: AtomicBool,
    refuse_start: AtomicBool,
    fail_stop: AtomicBool,
    callback: Mutex<Option<FrameCallback>>,
    starts: AtomicU32,
    stops: AtomicU32,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self {
            authorized: AtomicBool::new(true),
            refuse_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            callback: Mutex::new(None),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
        }
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Make `start_delivering` fail as if the platform refused
    pub fn set_refuse_start(&self, refuse: bool) {
        self.refuse_start.store(refuse, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Push a frame into the installed callback, synchronously like a real capture thread.
    ///
    /// Returns false when no delivery is active.
    pub fn deliver(&self, frame: RawFrame) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(frame);
                true
            }
            None => {
                debug!("Mock capture not delivering, frame {} discarded", frame.sequence);
                false
            }
        }
    }

    pub fn is_delivering(&self) -> bool {
        self.callback.lock().is_some()
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    async fn start_delivering(&self, callback: FrameCallback) -> Result<(), CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_start.load(Ordering::SeqCst) {
            return Err(CaptureError::StartFailed {
                details: "mock source refused".to_string(),
            });
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    async fn stop_delivering(&self) -> Result<(), CaptureError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.callback.lock().take();
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CaptureError::StopFailed {
                details: "mock source failed to stop".to_string(),
            });
        }
        Ok(())
    }
}
