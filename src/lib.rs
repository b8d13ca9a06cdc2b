//! trailgain - rating gain tracker for a community hiking platform
//!
//! Discovers concluded hiking events, records each participant's rating
//! before the event and, once the platform has finalised ratings, the rating
//! after it.
//!
//! # Architecture
//!
//! - [`config`] - Configuration file and environment overrides
//! - [`models`] - Accounts, sessions, events, routes and gain records
//! - [`storage`] - SQLite persistence behind repository traits
//! - [`platform`] - Client for the hiking platform (login and scraping)
//! - [`credentials`] - Account pool and session broker
//! - [`scheduler`] - Generic periodic worker and worker group
//! - [`workers`] - Event ingestion, gain reconciliation and route backfill
//! - [`api`] - HTTP control surface
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Time helpers, platform errors and retry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trailgain::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let stores = Stores::sqlite(&Database::open(&config.database.path)?);
//!     let client: SharedPlatformClient = Arc::new(HttpPlatformClient::new(&config.platform)?);
//!     let pool = AccountPool::new(stores.accounts.clone());
//!     let broker = Arc::new(CredentialBroker::new(pool, stores.sessions.clone(), client.clone()));
//!
//!     let group = trailgain::workers::build_group(&config, &stores, client, broker);
//!     group.start();
//!     group.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod workers;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::credentials::{AccountPool, CredentialBroker};
    pub use crate::error::{ClassifiedError, Error, ErrorCategory, Result};
    pub use crate::models::{Account, CycleReport, Event, GainRecord, RouteRecord, Session};
    pub use crate::platform::{HttpPlatformClient, PlatformClient, SharedPlatformClient};
    pub use crate::scheduler::{UnitOfWork, Worker, WorkerContext, WorkerGroup, WorkerStatus};
    pub use crate::storage::{Database, Stores};
}

pub use models::{Account, GainRecord, Session};
