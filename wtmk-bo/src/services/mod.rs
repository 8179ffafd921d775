//! Service layer: the polling monitor and the orchestration session

pub mod monitor;
pub mod session;

pub use monitor::{BatchMonitor, BatchSnapshot, MonitorConfig, MonitorHandle};
pub use session::{BatchSession, CancelOutcome, SessionError, SessionState};
