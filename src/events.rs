use crate::error::EventBusError;
use crate::recorder::RecordingState;
use crate::supervisor::ConnectionState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur in the framecast system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Supervisor connection state transition
    ConnectionStateChanged { state: ConnectionState },
    /// A reconnect attempt was scheduled after a transport failure
    ReconnectScheduled {
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
    },
    /// Automatic reconnection was abandoned
    ConnectionGivenUp { attempts: u32 },
    /// Recording controller state transition
    RecordingStateChanged {
        state: RecordingState,
        session_id: Option<Uuid>,
    },
    /// Elapsed recording time published once per tick
    ElapsedTick { elapsed_seconds: u64 },
    /// An out-of-band control token was delivered to the transport
    ControlSent { token: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
}

impl StreamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            StreamEvent::ConnectionStateChanged { state } => {
                format!("Connection {}", state)
            }
            StreamEvent::ReconnectScheduled {
                attempt,
                max_attempts,
                delay_ms,
            } => {
                format!(
                    "Reconnect attempt {}/{} in {}ms",
                    attempt, max_attempts, delay_ms
                )
            }
            StreamEvent::ConnectionGivenUp { attempts } => {
                format!("Connection given up after {} attempts", attempts)
            }
            StreamEvent::RecordingStateChanged { state, .. } => {
                format!("Recording {}", state)
            }
            StreamEvent::ElapsedTick { elapsed_seconds } => {
                format!("Recording for {}s", elapsed_seconds)
            }
            StreamEvent::ControlSent { token } => format!("Control token {} sent", token),
            StreamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            StreamEvent::ReconnectScheduled { .. } => "reconnect_scheduled",
            StreamEvent::ConnectionGivenUp { .. } => "connection_given_up",
            StreamEvent::RecordingStateChanged { .. } => "recording_state_changed",
            StreamEvent::ElapsedTick { .. } => "elapsed_tick",
            StreamEvent::ControlSent { .. } => "control_sent",
            StreamEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Event bus for status propagation using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<StreamEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Never blocks; callers may hold locks. Fails only when nobody is subscribed.
    pub fn publish(&self, event: StreamEvent) -> Result<usize, EventBusError> {
        match &event {
            StreamEvent::ConnectionStateChanged { state } => {
                info!("Connection state: {}", state);
            }
            StreamEvent::ConnectionGivenUp { attempts } => {
                error!("Connection given up after {} attempts", attempts);
            }
            StreamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            StreamEvent::RecordingStateChanged { state, .. } => {
                info!("Recording state: {}", state);
            }
            StreamEvent::ReconnectScheduled { .. } => {
                warn!("{}", event.description());
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();

        let delivered = bus
            .publish(StreamEvent::ConnectionGivenUp { attempts: 5 })
            .unwrap();
        assert_eq!(delivered, 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, StreamEvent::ConnectionGivenUp { attempts: 5 });
        assert_eq!(event.event_type(), "connection_given_up");
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .publish(StreamEvent::ElapsedTick { elapsed_seconds: 1 })
            .is_err());
    }

    #[test]
    fn test_event_serializes_to_json() {
        let event = StreamEvent::ConnectionStateChanged {
            state: ConnectionState::Reconnecting,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Reconnecting"));
        assert_eq!(event.description(), "Connection reconnecting");
    }
}
