use crate::error::CaptureError;
use crate::frame::RawFrame;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked by a capture source for every buffer, on the source's own thread
pub type FrameCallback = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// Platform screen capture facility
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Whether the user has granted capture permission
    fn is_authorized(&self) -> bool;

    /// Begin delivering buffers to `callback` until `stop_delivering`
    async fn start_delivering(&self, callback: FrameCallback) -> Result<(), CaptureError>;

    async fn stop_delivering(&self) -> Result<(), CaptureError>;
}
