//! The units of work plugged into the scheduler
//!
//! | worker id     | unit                          | default interval |
//! |---------------|-------------------------------|------------------|
//! | `past-event`  | [`EventIngestWorker`]         | 12h              |
//! | `points-gain` | [`GainReconciliationWorker`]  | 1h               |
//! | `route-cache` | [`RouteCacheWorker`]          | 1h (optional)    |

pub mod event_ingest;
pub mod gain_reconciliation;
pub mod route_cache;

pub use event_ingest::EventIngestWorker;
pub use gain_reconciliation::{window_for, GainReconciliationWorker};
pub use route_cache::RouteCacheWorker;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::credentials::CredentialBroker;
use crate::platform::SharedPlatformClient;
use crate::scheduler::{Worker, WorkerGroup};
use crate::storage::Stores;

/// Wire the configured workers into a group sharing one broker
pub fn build_group(
    config: &Config,
    stores: &Stores,
    client: SharedPlatformClient,
    broker: Arc<CredentialBroker>,
) -> WorkerGroup {
    let workers = &config.workers;

    let mut group = WorkerGroup::new()
        .with_worker(Worker::new(
            EventIngestWorker::NAME,
            Duration::from_secs(workers.event_ingest_interval_secs),
            Arc::new(EventIngestWorker::new(
                client.clone(),
                stores,
                config.ingest.clone(),
            )),
            broker.clone(),
        ))
        .with_worker(Worker::new(
            GainReconciliationWorker::NAME,
            Duration::from_secs(workers.reconciliation_interval_secs),
            Arc::new(GainReconciliationWorker::new(
                client.clone(),
                stores,
                config.reconcile.clone(),
            )),
            broker.clone(),
        ));

    if workers.route_cache_enabled {
        group.register(Worker::new(
            RouteCacheWorker::NAME,
            Duration::from_secs(workers.route_cache_interval_secs),
            Arc::new(RouteCacheWorker::new(client, stores)),
            broker,
        ));
    }

    group
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::models::{ActivityKind, Event, RouteRecord, RouteSummary, Session};
    use crate::scheduler::worker::tests::{test_broker, CountingUnit};
    use crate::scheduler::Worker;

    /// 20:30 so that `now - 80h` and `now - 72h` share a calendar day
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 20, 30, 0).unwrap()
    }

    pub fn session() -> Session {
        Session::new("alice", "session-alice").with_acquired_at(now())
    }

    /// A worker that never runs its loop, used as the context owner
    pub fn idle_worker() -> Worker {
        Worker::new(
            "test",
            Duration::from_secs(3600),
            Arc::new(CountingUnit::default()),
            test_broker(vec![]),
        )
    }

    pub fn event(id: i64, activity: ActivityKind, start_time: DateTime<Utc>) -> Event {
        Event {
            id,
            title: format!("Event {id}"),
            activity,
            route: RouteSummary {
                id: 10,
                title: "Ridge walk".to_string(),
                elevation: 850,
                distance: 12.5,
                scale: "T2".to_string(),
            },
            start_time,
            participant_ids: vec![],
            organizer_id: Some(1),
        }
    }

    pub fn route(id: i64, rating_points: Option<i64>) -> RouteRecord {
        RouteRecord {
            id,
            title: format!("Route {id}"),
            elevation: 900,
            distance: 10.0,
            scale: "T3".to_string(),
            rating_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::worker::tests::test_broker;

    #[test]
    fn test_build_group_honours_route_cache_flag() {
        let stores = Stores::mock();
        let client: SharedPlatformClient = Arc::new(crate::platform::MockPlatformClient::new());

        let group = build_group(&Config::default(), &stores, client.clone(), test_broker(vec![]));
        assert_eq!(group.names(), vec!["past-event", "points-gain", "route-cache"]);

        let mut config = Config::default();
        config.workers.route_cache_enabled = false;
        let group = build_group(&config, &stores, client, test_broker(vec![]));
        assert_eq!(group.names(), vec!["past-event", "points-gain"]);
        assert_eq!(
            group.get("points-gain").map(|w| w.interval()),
            Some(Duration::from_secs(3600))
        );
    }
}
