use super::{FramecastApp, ShutdownReason};
use crate::error::{FramecastError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type ShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl FramecastApp {
    /// Run until a signal, an explicit request or the optional duration ends the session
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<i32> {
        info!("Framecast is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| FramecastError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers();
        if let Some(duration) = duration {
            self.setup_duration_timer(duration);
        }

        let shutdown_reason = shutdown_receiver.await.map_err(|_| FramecastError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Framecast shutdown complete");
        Ok(exit_code)
    }

    fn setup_duration_timer(&self, duration: Duration) {
        let sender = Arc::clone(&self.shutdown_sender);
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    info!("Run duration of {:?} elapsed", duration);
                    send_reason(&sender, ShutdownReason::DurationElapsed).await;
                }
            }
        });
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_reason(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        // SIGINT (Ctrl+C) - Cross-platform
        let sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_reason(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }
}

async fn send_reason(sender: &ShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
