pub mod app;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod recorder;
pub mod supervisor;
pub mod transport;

#[cfg(feature = "receiver")]
pub mod receiver;

pub use app::{ComponentState, FramecastApp, ShutdownReason};
pub use capture::{
    CapturePipeline, CaptureSource, FrameCallback, MockCaptureSource, PipelineStats,
    SyntheticCaptureSource,
};
pub use config::FramecastConfig;
pub use encoder::{FrameEncoder, JpegFrameEncoder};
pub use error::{CaptureError, FramecastError, RecordingError, Result, TransportError};
pub use events::{EventBus, StreamEvent};
pub use frame::{FramePayload, MediaType, PixelFormat, RawFrame};
pub use recorder::{
    BackgroundGrant, ExecutionHost, NoopExecutionHost, RecorderStatus, RecordingController,
    RecordingControllerBuilder, RecordingState, STOP_RECORDING,
};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, DropReason, ReconnectPolicy, SendOutcome,
    SupervisorStats,
};
pub use transport::{
    Endpoint, InboundMessage, MockConnector, StreamTransport, TransportConnector,
    WebSocketConnector,
};

#[cfg(feature = "receiver")]
pub use receiver::{FrameReceiver, ReceiverStats};
