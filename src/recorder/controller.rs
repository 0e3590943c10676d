use super::{BackgroundGrant, ElapsedTicker, ExecutionHost, NoopExecutionHost, RecorderStatus, RecordingState};
use crate::capture::{CapturePipeline, CaptureSource, PipelineStats};
use crate::config::FramecastConfig;
use crate::encoder::{FrameEncoder, JpegFrameEncoder};
use crate::error::{CaptureError, FramecastError, RecordingError, Result};
use crate::events::{EventBus, StreamEvent};
use crate::supervisor::{ConnectionState, ConnectionSupervisor, SendOutcome, SupervisorStats};
use crate::transport::{Endpoint, TransportConnector, WebSocketConnector};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Text control message telling the consumer the recording ended
pub const STOP_RECORDING: &str = "STOP_RECORDING";

const BACKGROUND_REASON: &str = "framecast recording";

/// Drives capture, encoding and transmission through `Idle → Starting → Recording →
/// Stopping → Idle`.
///
/// Operator commands are serialized; a command that is invalid for the current state fails
/// without changing it.
pub struct RecordingController {
    endpoint: Mutex<String>,
    tick_interval: Duration,
    stop_on_give_up: bool,
    max_attempts: u32,
    supervisor: Arc<ConnectionSupervisor>,
    pipeline: CapturePipeline,
    capture: Arc<dyn CaptureSource>,
    host: Arc<dyn ExecutionHost>,
    event_bus: Arc<EventBus>,
    recording_tx: watch::Sender<RecordingState>,
    status_tx: Arc<watch::Sender<RecorderStatus>>,
    operation: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<ElapsedTicker>>,
    background_grant: Mutex<Option<BackgroundGrant>>,
    cancel: CancellationToken,
}

impl RecordingController {
    pub fn builder() -> RecordingControllerBuilder {
        RecordingControllerBuilder::new()
    }

    /// Begin a recording session
    pub async fn start(&self) -> Result<()> {
        let _operation = self.operation.lock().await;

        let current = self.recording_state();
        if current != RecordingState::Idle {
            debug!("Start ignored while {}", current);
            return Err(RecordingError::AlreadyRecording.into());
        }

        if !self.capture.is_authorized() {
            let err = CaptureError::NotAuthorized;
            self.record_error(err.to_string());
            return Err(err.into());
        }

        self.set_recording(RecordingState::Starting);

        let endpoint = self.endpoint.lock().clone();
        if let Err(e) = self.supervisor.start(&endpoint).await {
            self.set_recording(RecordingState::Idle);
            self.record_error(e.to_string());
            return Err(e.into());
        }

        if let Err(e) = self.capture.start_delivering(self.pipeline.sink()).await {
            self.supervisor.disconnect().await;
            self.set_recording(RecordingState::Idle);
            let err = RecordingError::SetupFailed {
                details: e.to_string(),
            };
            self.record_error(err.to_string());
            return Err(err.into());
        }

        let session_id = Uuid::new_v4();
        self.status_tx.send_modify(|status| {
            status.session_id = Some(session_id);
            status.started_at = Some(Utc::now());
            status.elapsed_seconds = 0;
            status.last_error = None;
        });
        self.set_recording(RecordingState::Recording);

        let ticker = ElapsedTicker::start(
            self.tick_interval,
            Arc::clone(&self.status_tx),
            Arc::clone(&self.event_bus),
        );
        if let Some(previous) = self.ticker.lock().replace(ticker) {
            previous.cancel();
        }

        info!("Recording session {} started, streaming to {}", session_id, endpoint);
        Ok(())
    }

    /// End the current recording session
    pub async fn stop(&self) -> Result<()> {
        let _operation = self.operation.lock().await;

        let current = self.recording_state();
        if current != RecordingState::Recording {
            debug!("Stop ignored while {}", current);
            return Err(RecordingError::NotRecording.into());
        }

        self.set_recording(RecordingState::Stopping);

        match self.supervisor.send_control(STOP_RECORDING).await {
            SendOutcome::Sent => info!("Sent {} to consumer", STOP_RECORDING),
            SendOutcome::Dropped(reason) => {
                info!("{} not delivered: {:?}", STOP_RECORDING, reason)
            }
        }

        if let Err(e) = self.capture.stop_delivering().await {
            warn!("Capture source did not stop cleanly: {}", e);
        }

        if let Some(ticker) = self.ticker.lock().take() {
            ticker.cancel();
        }
        self.release_background_grant();
        self.supervisor.disconnect().await;

        let session_id = self.status_tx.borrow().session_id;
        self.status_tx.send_modify(|status| {
            status.elapsed_seconds = 0;
            status.session_id = None;
            status.started_at = None;
        });
        self.set_recording(RecordingState::Idle);

        if let Some(session_id) = session_id {
            info!("Recording session {} stopped", session_id);
        }
        Ok(())
    }

    /// Point the controller at a new endpoint and connect to it
    pub async fn connect(&self, url: &str) -> Result<()> {
        let _operation = self.operation.lock().await;

        let endpoint = Endpoint::parse(url)?;
        *self.endpoint.lock() = endpoint.url().to_string();
        self.supervisor.start(endpoint.url()).await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        let _operation = self.operation.lock().await;
        self.supervisor.disconnect().await;
    }

    pub fn network_path_changed(&self, satisfied: bool) {
        self.supervisor.network_path_changed(satisfied);
    }

    /// Ask the host to keep us running while backgrounded. Returns whether a grant is held.
    pub fn enter_background(&self) -> bool {
        if self.recording_state() != RecordingState::Recording {
            return false;
        }

        let mut grant = self.background_grant.lock();
        if grant.is_some() {
            return true;
        }

        match self.host.begin_background_execution(BACKGROUND_REASON) {
            Some(granted) => {
                info!("Background execution granted ({})", granted.id());
                *grant = Some(granted);
                true
            }
            None => {
                warn!("Background execution refused; streaming may be suspended");
                false
            }
        }
    }

    pub fn enter_foreground(&self) {
        self.release_background_grant();
    }

    pub fn has_background_grant(&self) -> bool {
        self.background_grant.lock().is_some()
    }

    pub fn status(&self) -> RecorderStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RecorderStatus> {
        self.status_tx.subscribe()
    }

    pub fn recording_state(&self) -> RecordingState {
        *self.recording_tx.borrow()
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.lock().clone()
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn supervisor_stats(&self) -> SupervisorStats {
        self.supervisor.stats()
    }

    /// Stop any recording, drop the connection and end background tasks
    pub async fn shutdown(&self) {
        info!("Shutting down recording controller");

        if self.recording_state() == RecordingState::Recording {
            if let Err(e) = self.stop().await {
                warn!("Stop during shutdown failed: {}", e);
            }
        }

        self.supervisor.disconnect().await;
        self.release_background_grant();
        self.cancel.cancel();
        self.pipeline.shutdown().await;
    }

    fn set_recording(&self, state: RecordingState) {
        self.recording_tx.send_replace(state);
        self.status_tx.send_modify(|status| status.recording = state);

        let session_id = self.status_tx.borrow().session_id;
        let _ = self
            .event_bus
            .publish(StreamEvent::RecordingStateChanged { state, session_id });
    }

    fn record_error(&self, message: String) {
        error!("Recording error: {}", message);
        self.status_tx
            .send_modify(|status| status.last_error = Some(message.clone()));
        let _ = self.event_bus.publish(StreamEvent::SystemError {
            component: "recorder".to_string(),
            error: message,
        });
    }

    fn release_background_grant(&self) {
        if let Some(grant) = self.background_grant.lock().take() {
            debug!("Releasing background grant {}", grant.id());
            self.host.end_background_execution(grant);
        }
    }

    async fn on_connection_state(&self, state: ConnectionState) {
        self.status_tx.send_modify(|status| status.connection = state);

        if state != ConnectionState::GivenUp {
            return;
        }

        let err = RecordingError::ConnectionGivenUp {
            attempts: self.max_attempts,
        };
        self.record_error(err.to_string());

        if self.stop_on_give_up && self.recording_state() == RecordingState::Recording {
            info!("Stopping recording after connection was given up");
            if let Err(e) = self.stop().await {
                debug!("Stop after give-up skipped: {}", e);
            }
        }
    }

    fn spawn_status_forwarder(controller: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(controller);
        let cancel = controller.cancel.clone();
        let mut states = controller.supervisor.subscribe_state();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let state = *states.borrow_and_update();
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.on_connection_state(state).await;
            }
            debug!("Status forwarder stopped");
        });
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Assembles a controller; only the capture source is mandatory
pub struct RecordingControllerBuilder {
    config: Option<FramecastConfig>,
    connector: Option<Arc<dyn TransportConnector>>,
    capture: Option<Arc<dyn CaptureSource>>,
    encoder: Option<Arc<dyn FrameEncoder>>,
    host: Option<Arc<dyn ExecutionHost>>,
    event_bus: Option<Arc<EventBus>>,
}

impl RecordingControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            connector: None,
            capture: None,
            encoder: None,
            host: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: FramecastConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn capture_source(mut self, capture: Arc<dyn CaptureSource>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn execution_host(mut self, host: Arc<dyn ExecutionHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Build the controller. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Arc<RecordingController>> {
        let capture = self
            .capture
            .ok_or_else(|| FramecastError::system("Capture source is required"))?;
        let config = self.config.unwrap_or_default();

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WebSocketConnector::new(
                config.endpoint.handshake_timeout(),
                config.keepalive.pong_timeout(),
            ))
        });
        let encoder = self
            .encoder
            .unwrap_or_else(|| Arc::new(JpegFrameEncoder::new(config.encoder.jpeg_quality)));
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(NoopExecutionHost::new()));
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));

        let supervisor = Arc::new(ConnectionSupervisor::from_config(
            &config,
            connector,
            Arc::clone(&event_bus),
        ));

        let (recording_tx, recording_rx) = watch::channel(RecordingState::Idle);
        let pipeline = CapturePipeline::new(
            encoder,
            Arc::clone(&supervisor),
            recording_rx,
            config.pipeline.queue_capacity,
        );

        let (status_tx, _) = watch::channel(RecorderStatus {
            connection: supervisor.state(),
            ..RecorderStatus::default()
        });

        let controller = Arc::new(RecordingController {
            endpoint: Mutex::new(config.endpoint.url.clone()),
            tick_interval: config.recording.tick_interval(),
            stop_on_give_up: config.recording.stop_on_give_up,
            max_attempts: config.reconnect.max_attempts,
            supervisor,
            pipeline,
            capture,
            host,
            event_bus,
            recording_tx,
            status_tx: Arc::new(status_tx),
            operation: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
            background_grant: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        RecordingController::spawn_status_forwarder(&controller);
        Ok(controller)
    }
}

impl Default for RecordingControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
