//! Named registry of workers sharing one shutdown barrier

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::worker::{Worker, WorkerStatus};

#[derive(Default)]
pub struct WorkerGroup {
    workers: BTreeMap<String, Arc<Worker>>,
    tracker: TaskTracker,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its name, replacing any previous one
    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.register(worker);
        self
    }

    pub fn register(&mut self, worker: Worker) {
        let name = worker.name().to_string();
        if self.workers.insert(name.clone(), Arc::new(worker)).is_some() {
            warn!(worker = %name, "Replaced an already registered worker");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Worker>> {
        self.workers.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start every worker; returns how many were started
    ///
    /// Workers that are already running are left alone.
    pub fn start(&self) -> usize {
        self.tracker.reopen();
        let started = self
            .workers
            .values()
            .filter(|worker| worker.start(&self.tracker).is_ok())
            .count();
        info!(started, total = self.workers.len(), "Worker group started");
        started
    }

    pub fn start_worker(&self, name: &str) -> SchedulerResult<()> {
        self.tracker.reopen();
        self.lookup(name)?.start(&self.tracker)
    }

    /// Ask every worker to stop; does not wait for the loops to exit
    pub fn stop(&self) {
        for worker in self.workers.values() {
            worker.stop();
        }
        info!("Worker group stop requested");
    }

    pub fn stop_worker(&self, name: &str) -> SchedulerResult<bool> {
        Ok(self.lookup(name)?.stop())
    }

    pub fn status(&self) -> BTreeMap<String, WorkerStatus> {
        self.workers
            .iter()
            .map(|(name, worker)| (name.clone(), worker.status()))
            .collect()
    }

    /// Stop every worker and wait until all loops have exited
    pub async fn shutdown(&self) {
        self.stop();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All workers exited");
    }

    fn lookup(&self, name: &str) -> SchedulerResult<&Arc<Worker>> {
        self.workers
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownWorker(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Account;
    use crate::scheduler::worker::tests::{test_broker, CountingUnit};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn worker(name: &str, unit: Arc<CountingUnit>) -> Worker {
        Worker::new(
            name,
            Duration::from_secs(3600),
            unit,
            test_broker(vec![Account::new("alice", "pw")]),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_fan_out() {
        let a = Arc::new(CountingUnit::default());
        let b = Arc::new(CountingUnit::default());
        let group = WorkerGroup::new()
            .with_worker(worker("a", a.clone()))
            .with_worker(worker("b", b.clone()));

        assert_eq!(group.start(), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = group.status();
        assert_eq!(status.len(), 2);
        assert!(status.values().all(|s| s.running && s.last_run.is_some()));
        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);

        group.shutdown().await;
        assert!(group
            .status()
            .values()
            .all(|s| !s.running && s.last_run.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let unit = Arc::new(CountingUnit::default());
        let group = WorkerGroup::new().with_worker(worker("a", unit.clone()));

        assert_eq!(group.start(), 1);
        assert_eq!(group.start(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(unit.runs.load(Ordering::SeqCst), 1);

        group.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_control() {
        let group = WorkerGroup::new()
            .with_worker(worker("a", Arc::new(CountingUnit::default())))
            .with_worker(worker("b", Arc::new(CountingUnit::default())));

        group.start_worker("a").unwrap();
        let status = group.status();
        assert!(status["a"].running);
        assert!(!status["b"].running);

        assert!(group.stop_worker("a").unwrap());
        assert!(matches!(
            group.start_worker("missing"),
            Err(SchedulerError::UnknownWorker(_))
        ));

        group.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_shutdown() {
        let unit = Arc::new(CountingUnit::default());
        let group = WorkerGroup::new().with_worker(worker("a", unit.clone()));

        group.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        group.shutdown().await;

        assert_eq!(group.start(), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(unit.runs.load(Ordering::SeqCst), 2);
        group.shutdown().await;
    }
}
