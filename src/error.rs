use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FramecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures of a single transport instance or connection attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid endpoint '{endpoint}': {details}")]
    InvalidEndpoint { endpoint: String, details: String },

    #[error("Connection to {endpoint} failed: {details}")]
    ConnectFailed { endpoint: String, details: String },

    #[error("Handshake with {endpoint} timed out after {timeout:?}")]
    HandshakeTimeout { endpoint: String, timeout: Duration },

    #[error("Send failed: {details}")]
    SendFailed { details: String },

    #[error("Receive failed: {details}")]
    ReceiveFailed { details: String },

    #[error("Ping failed: {details}")]
    PingFailed { details: String },

    #[error("Connection closed")]
    Closed,

    #[error("Failed to bind {address}: {details}")]
    BindFailed { address: String, details: String },
}

impl TransportError {
    /// Check if this error should be recovered by reconnecting
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TransportError::InvalidEndpoint { .. } | TransportError::BindFailed { .. }
        )
    }
}

/// Failures reported by the external capture source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Capture is not authorized")]
    NotAuthorized,

    #[error("Capture source refused to start: {details}")]
    StartFailed { details: String },

    #[error("Capture source failed to stop: {details}")]
    StopFailed { details: String },
}

/// Recording state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordingError {
    #[error("Recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Recording setup failed: {details}")]
    SetupFailed { details: String },

    #[error("Connection given up after {attempts} reconnect attempts")]
    ConnectionGivenUp { attempts: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

impl FramecastError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Check if the error is transient and handled by automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            FramecastError::Transport(e) => e.is_recoverable(),
            FramecastError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FramecastError>;
