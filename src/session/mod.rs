//! Per-connection session state and command handling

pub mod processor;
pub mod state;

pub use processor::CommandProcessor;
pub use state::{SessionPhase, SessionState};
