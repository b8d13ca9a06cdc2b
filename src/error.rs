//! Unified error handling for the trailgain crate
//!
//! Domain modules keep their own error enums; [`Error`] wraps all of them so a
//! worker cycle, a CLI command or a control-surface handler can return one type.
//!
//! ```rust,ignore
//! use trailgain::error::{ClassifiedError, Error};
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "retrying next tick: {err}");
//!     } else {
//!         tracing::error!("{err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::credentials::BrokerError;
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StorageError;
pub use crate::utils::error::{FetchError, PlatformError};

/// Common interface of the crate's error types
pub trait ClassifiedError: std::error::Error {
    /// Whether the next tick may succeed without operator action
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// External platform unreachable or answering unexpectedly
    Network,
    /// Login rejected or no account to log in with
    Auth,
    Storage,
    Config,
    Scheduler,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the trailgain crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ClassifiedError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Platform(_) => true,
            Self::Broker(e) => !matches!(e, BrokerError::Persistence(_)),
            Self::Storage(e) => !matches!(e, StorageError::Poisoned),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Platform(PlatformError::Auth(_)) => ErrorCategory::Auth,
            Self::Platform(_) => ErrorCategory::Network,
            Self::Broker(BrokerError::Persistence(_)) => ErrorCategory::Storage,
            Self::Broker(_) => ErrorCategory::Auth,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

/// Result type alias using the unified Error
pub type Result<T> = std::result::Result<T, Error>;
