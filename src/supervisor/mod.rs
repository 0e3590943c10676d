mod core;
mod policy;
mod stats;
mod types;
#[cfg(test)]
mod tests;

pub use self::core::ConnectionSupervisor;
pub use policy::ReconnectPolicy;
pub use stats::SupervisorStats;
pub use types::{ConnectionState, DropReason, SendOutcome};
