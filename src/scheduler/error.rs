//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Start requested while the loop is running
    AlreadyRunning { worker: String },

    /// Start requested while the previous loop has not exited yet
    StillStopping { worker: String },

    /// No worker registered under this name
    UnknownWorker(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning { worker } => {
                write!(f, "Worker '{}' is already running", worker)
            }
            Self::StillStopping { worker } => {
                write!(f, "Worker '{}' has not finished its previous run", worker)
            }
            Self::UnknownWorker(name) => write!(f, "Unknown worker: {}", name),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// A refused start can succeed once the previous loop exits
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StillStopping { .. })
    }
}
