use super::{RecorderStatus, RecordingState};
use crate::events::{EventBus, StreamEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Publishes elapsed recording time until cancelled or recording ends
pub struct ElapsedTicker {
    cancel: CancellationToken,
}

impl ElapsedTicker {
    pub fn start(
        interval: Duration,
        status: Arc<watch::Sender<RecorderStatus>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = interval_at(started + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        let elapsed_seconds = started.elapsed().as_secs();
                        // Checked under the status lock so a concurrent stop wins
                        let published = status.send_if_modified(|s| {
                            if s.recording != RecordingState::Recording {
                                return false;
                            }
                            s.elapsed_seconds = elapsed_seconds;
                            true
                        });
                        if !published {
                            break;
                        }
                        let _ = event_bus.publish(StreamEvent::ElapsedTick { elapsed_seconds });
                    }
                }
            }

            debug!("Elapsed ticker stopped");
        });

        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
