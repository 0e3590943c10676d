mod mock;
mod pipeline;
mod source;
mod stats;
mod synthetic;

pub use mock::MockCaptureSource;
pub use pipeline::CapturePipeline;
pub use source::{CaptureSource, FrameCallback};
pub use stats::PipelineStats;
pub use synthetic::SyntheticCaptureSource;
