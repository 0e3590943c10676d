mod controller;
mod host;
mod ticker;
mod types;

pub use controller::{RecordingController, RecordingControllerBuilder, STOP_RECORDING};
pub use host::{ExecutionHost, MockExecutionHost, NoopExecutionHost};
pub use ticker::ElapsedTicker;
pub use types::{BackgroundGrant, RecorderStatus, RecordingState};
