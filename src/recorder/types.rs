use crate::supervisor::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recording lifecycle owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Recording,
    Stopping,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Starting => "starting",
            RecordingState::Recording => "recording",
            RecordingState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Snapshot published to observers as one value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub connection: ConnectionState,
    pub recording: RecordingState,
    pub elapsed_seconds: u64,
    pub last_error: Option<String>,
    pub session_id: Option<Uuid>,
    /// Wall-clock start of the current session
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            recording: RecordingState::Idle,
            elapsed_seconds: 0,
            last_error: None,
            session_id: None,
            started_at: None,
        }
    }
}

/// Permission from the host to keep running while backgrounded; hand it back when done
#[derive(Debug, PartialEq, Eq)]
pub struct BackgroundGrant {
    id: u64,
    reason: String,
}

impl BackgroundGrant {
    pub fn new(id: u64, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
