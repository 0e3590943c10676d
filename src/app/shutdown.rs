use super::{ComponentState, FramecastApp};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

/// Upper bound for stopping the recording, including the final control message
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl FramecastApp {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        self.set_component_state("recorder", ComponentState::Stopping)
            .await;
        match timeout(STOP_TIMEOUT, self.controller.shutdown()).await {
            Ok(()) => {
                self.set_component_state("recorder", ComponentState::Stopped)
                    .await;
                info!("recorder component stopped");
            }
            Err(_) => {
                self.set_component_state("recorder", ComponentState::Failed)
                    .await;
                error!("recorder component stop timeout");
                exit_code = 1;
            }
        }

        // Cancel remaining background tasks
        self.cancellation_token.cancel();
        self.set_component_state("event_logger", ComponentState::Stopped)
            .await;

        self.log_final_stats();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    fn log_final_stats(&self) {
        let pipeline = self.controller.pipeline_stats();
        let supervisor = self.controller.supervisor_stats();

        info!(
            "Pipeline: {} received, {} sent, {} dropped (queue full {}, idle {}, encode {}, disconnected {}), efficiency {:.1}%",
            pipeline.frames_received,
            pipeline.frames_sent,
            pipeline.frames_dropped(),
            pipeline.queue_full_dropped,
            pipeline.idle_dropped,
            pipeline.encode_failures,
            pipeline.disconnected_dropped,
            pipeline.efficiency() * 100.0
        );
        info!(
            "Connection: {} connects, {} reconnect attempts, {} failures, {} bytes sent",
            supervisor.successful_connections,
            supervisor.reconnect_attempts,
            supervisor.transport_failures,
            supervisor.bytes_sent
        );
    }
}
