//! Generic periodic worker
//!
//! A [`Worker`] owns one execution loop. Each iteration evaluates a
//! [`ProceedSignal`]: `Stop` ends the loop, `Ignore` waits for the rest of
//! the interval (interruptible by [`Worker::stop`]), `Process` runs one cycle.
//! A cycle acquires a session from the [`CredentialBroker`] and hands it to
//! the worker's [`UnitOfWork`]. The completion time is recorded whether the
//! cycle succeeded or not, so a failing cycle is retried one interval later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use super::error::{SchedulerError, SchedulerResult};
use crate::credentials::CredentialBroker;
use crate::error::Result;
use crate::metrics;
use crate::models::{CycleReport, Session};

const INTERVAL_OVERSHOOT: Duration = Duration::from_millis(1);

/// Decision taken once per loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedSignal {
    Stop,
    Ignore,
    Process,
}

/// Read-only view of a worker's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
}

/// What a unit of work sees during one cycle
pub struct WorkerContext<'a> {
    pub worker: &'a Worker,
    pub session: &'a Session,
    detached: bool,
}

impl<'a> WorkerContext<'a> {
    pub fn new(worker: &'a Worker, session: &'a Session) -> Self {
        Self {
            worker,
            session,
            detached: false,
        }
    }

    /// True once the owning loop was asked to stop
    ///
    /// Batch workers check this between items. Cycles started with
    /// [`Worker::run_once`] are never asked to stop.
    pub fn should_stop(&self) -> bool {
        !self.detached && self.worker.is_stop_requested()
    }
}

/// The job plugged into a [`Worker`]
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn run(&self, ctx: &WorkerContext<'_>) -> Result<CycleReport>;
}

#[derive(Debug, Clone, Copy)]
struct LastRun {
    at: Instant,
    wall: DateTime<Utc>,
}

pub struct Worker {
    name: String,
    interval: Duration,
    running: AtomicBool,
    stop_requested: AtomicBool,
    last_run: RwLock<Option<LastRun>>,
    wake: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    unit: Arc<dyn UnitOfWork>,
    broker: Arc<CredentialBroker>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        unit: Arc<dyn UnitOfWork>,
        broker: Arc<CredentialBroker>,
    ) -> Self {
        let (wake, _) = watch::channel(false);
        Self {
            name: name.into(),
            interval,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            last_run: RwLock::new(None),
            wake,
            handle: Mutex::new(None),
            unit,
            broker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the execution loop on `tracker`
    ///
    /// Refused when the loop is already running or when a stopped loop has
    /// not exited yet; the worker is never started twice.
    pub fn start(self: &Arc<Self>, tracker: &TaskTracker) -> SchedulerResult<()> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);

        if self.running.load(Ordering::SeqCst) {
            warn!(worker = %self.name, "Worker already running, ignoring start");
            return Err(SchedulerError::AlreadyRunning {
                worker: self.name.clone(),
            });
        }

        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!(worker = %self.name, "Previous run still finishing, ignoring start");
            return Err(SchedulerError::StillStopping {
                worker: self.name.clone(),
            });
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.wake.send_replace(false);
        let wake_rx = self.wake.subscribe();

        let span = info_span!("worker", name = %self.name);
        *handle = Some(tracker.spawn(Arc::clone(self).run_loop(wake_rx).instrument(span)));

        metrics::set_worker_running(&self.name, true);
        info!(worker = %self.name, interval_secs = self.interval.as_secs(), "Worker started");
        Ok(())
    }

    /// Ask the loop to exit; returns whether it was running
    ///
    /// A cycle in progress finishes its current item first.
    pub fn stop(&self) -> bool {
        self.stop_requested.store(true, Ordering::SeqCst);
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.wake.send_replace(true);
        if was_running {
            info!(worker = %self.name, "Stop requested");
        }
        was_running
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.running.load(Ordering::SeqCst),
            last_run: self.last_run_entry().map(|r| r.wall),
        }
    }

    /// `Stop` when not running, `Ignore` while the time since the last cycle
    /// is at most the interval, `Process` once it exceeds the interval or no
    /// cycle has run yet.
    pub fn proceed_signal(&self) -> ProceedSignal {
        if !self.running.load(Ordering::SeqCst) {
            return ProceedSignal::Stop;
        }
        match self.last_run_entry() {
            Some(last) if last.at.elapsed() <= self.interval => ProceedSignal::Ignore,
            _ => ProceedSignal::Process,
        }
    }

    /// Run one cycle outside the loop
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.cycle(true)
            .instrument(info_span!("worker", name = %self.name))
            .await
    }

    async fn run_loop(self: Arc<Self>, mut wake_rx: watch::Receiver<bool>) {
        loop {
            match self.proceed_signal() {
                ProceedSignal::Stop => break,
                ProceedSignal::Ignore => {
                    let wait = self.remaining_wait();
                    debug!(wait_secs = wait.as_secs(), "Waiting for next cycle");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        changed = wake_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                ProceedSignal::Process => {
                    let _ = self.cycle(false).await;
                }
            }
        }

        *self.last_run.write().unwrap_or_else(PoisonError::into_inner) = None;
        metrics::set_worker_running(&self.name, false);
        info!("Worker stopped");
    }

    async fn cycle(&self, detached: bool) -> Result<CycleReport> {
        let _timer = metrics::start_cycle_timer(&self.name);
        let result = self.execute(detached).await;

        *self.last_run.write().unwrap_or_else(PoisonError::into_inner) = Some(LastRun {
            at: Instant::now(),
            wall: Utc::now(),
        });

        match &result {
            Ok(report) => {
                info!(
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    abandoned = report.abandoned,
                    "Cycle finished"
                );
                metrics::record_cycle(&self.name, "ok", report);
            }
            Err(e) => {
                warn!(error = %e, "Cycle failed, retrying after the interval");
                metrics::record_cycle(&self.name, "error", &CycleReport::default());
            }
        }
        result
    }

    async fn execute(&self, detached: bool) -> Result<CycleReport> {
        let session = self.broker.acquire().await?;
        let ctx = WorkerContext {
            worker: self,
            session: &session,
            detached,
        };
        self.unit.run(&ctx).await
    }

    fn last_run_entry(&self) -> Option<LastRun> {
        *self.last_run.read().unwrap_or_else(PoisonError::into_inner)
    }

    // Sleeps just past the interval so the next signal is `Process`
    fn remaining_wait(&self) -> Duration {
        match self.last_run_entry() {
            Some(last) => self.interval.saturating_sub(last.at.elapsed()) + INTERVAL_OVERSHOOT,
            None => Duration::ZERO,
        }
    }
}
