//! Periodic worker scheduling
//!
//! - [`worker`] - the generic [`Worker`] loop and the [`UnitOfWork`] seam
//! - [`group`] - [`WorkerGroup`], start/stop/status over named workers
//! - [`error`] - [`SchedulerError`]
//!
//! ```ignore
//! use trailgain::scheduler::{Worker, WorkerGroup};
//!
//! let group = WorkerGroup::new()
//!     .with_worker(Worker::new("points-gain", Duration::from_secs(3600), unit, broker));
//! group.start();
//! // ...
//! group.shutdown().await;
//! ```

pub mod error;
pub mod group;
pub mod worker;

pub use error::{SchedulerError, SchedulerResult};
pub use group::WorkerGroup;
pub use worker::{ProceedSignal, UnitOfWork, Worker, WorkerContext, WorkerStatus};
