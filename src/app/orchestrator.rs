use super::types::{ComponentState, ShutdownReason};
use crate::capture::{CaptureSource, SyntheticCaptureSource};
use crate::config::FramecastConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::recorder::RecordingController;
use crate::transport::TransportConnector;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Wires configuration, capture source and recording controller into one process
pub struct FramecastApp {
    pub(super) config: FramecastConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) controller: Arc<RecordingController>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl FramecastApp {
    /// Create the app with the synthetic capture source and a WebSocket connector
    pub async fn new(config: FramecastConfig) -> Result<Self> {
        let capture = Arc::new(SyntheticCaptureSource::from_config(&config.capture));
        Self::with_components(config, capture, None).await
    }

    /// Create the app around an explicit capture source and, optionally, connector
    pub async fn with_components(
        config: FramecastConfig,
        capture: Arc<dyn CaptureSource>,
        connector: Option<Arc<dyn TransportConnector>>,
    ) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        let mut builder = RecordingController::builder()
            .config(config.clone())
            .capture_source(capture)
            .event_bus(Arc::clone(&event_bus));
        if let Some(connector) = connector {
            builder = builder.connector(connector);
        }
        let controller = builder.build()?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            controller,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &FramecastConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<RecordingController> {
        &self.controller
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Ask a running `run` loop to shut down. Returns false if shutdown was already requested.
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
