use super::{ComponentState, FramecastApp};
use crate::error::Result;
use crate::events::StreamEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

impl FramecastApp {
    /// Register components before starting
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing framecast components");

        let mut states = self.component_states.lock().await;
        states.insert("event_logger".to_string(), ComponentState::Stopped);
        states.insert("recorder".to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start event logging and the recording session
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting framecast, streaming to {}", self.controller.endpoint());

        self.set_component_state("event_logger", ComponentState::Starting)
            .await;
        self.spawn_event_logger();
        self.set_component_state("event_logger", ComponentState::Running)
            .await;

        self.set_component_state("recorder", ComponentState::Starting)
            .await;
        if let Err(e) = self.controller.start().await {
            self.set_component_state("recorder", ComponentState::Failed)
                .await;
            error!("Failed to start recording: {}", e);
            return Err(e);
        }
        self.set_component_state("recorder", ComponentState::Running)
            .await;

        info!("Framecast started successfully");
        Ok(())
    }

    /// Mirror bus events into the log as JSON records
    fn spawn_event_logger(&self) {
        let mut receiver = self.event_bus.subscribe();
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event logger lagged by {} events; continuing", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Event logger stopped");
        });
    }
}

fn log_event(event: &StreamEvent) {
    match serde_json::to_string(event) {
        Ok(json) => debug!(event_type = event.event_type(), event = %json, "{}", event.description()),
        Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
    }
}
