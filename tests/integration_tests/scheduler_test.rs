//! Worker group lifecycle with the real workers on paused time

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use trailgain::config::Config;
use trailgain::platform::{MockPlatformClient, SharedPlatformClient};
use trailgain::scheduler::SchedulerError;
use trailgain::workers::build_group;

use crate::common::{broker_with_alice, hiking_event, route, sqlite_stores};

fn live_client() -> Arc<MockPlatformClient> {
    Arc::new(
        MockPlatformClient::new()
            .with_events(vec![hiking_event(900, 10, Utc::now() - chrono::Duration::hours(1))])
            .with_participants(900, vec![7, 8])
            .with_points(7, 120)
            .with_points(8, 95)
            .with_route(route(10, Some(300))),
    )
}

#[tokio::test(start_paused = true)]
async fn test_group_runs_every_worker_with_one_login() {
    let client = live_client();
    let shared: SharedPlatformClient = client.clone();
    let stores = sqlite_stores();
    let broker = broker_with_alice(&stores, shared.clone());
    stores.routes.upsert_points_only(&route(10, Some(300))).unwrap();

    let group = build_group(&Config::default(), &stores, shared, broker);
    assert_eq!(group.start(), 3);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = group.status();
    assert_eq!(status.len(), 3);
    assert!(status.values().all(|s| s.running && s.last_run.is_some()));

    // The first cycle caches the session, later cycles reuse it
    assert_eq!(client.login_count(), 1);
    assert_eq!(stores.point_gains.list_by_event_id(900).unwrap().len(), 2);

    // Route 1 is a gap below the known route 10 and gets tombstoned
    assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 2);

    group.shutdown().await;
    let status = group.status();
    assert!(status.values().all(|s| !s.running && s.last_run.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_single_worker_stop_and_restart() {
    let client: SharedPlatformClient = live_client();
    let stores = sqlite_stores();
    let broker = broker_with_alice(&stores, client.clone());

    let mut config = Config::default();
    config.workers.route_cache_enabled = false;
    let group = build_group(&config, &stores, client, broker);
    assert_eq!(group.names(), vec!["past-event", "points-gain"]);

    group.start_worker("past-event").unwrap();
    assert!(matches!(
        group.start_worker("past-event"),
        Err(SchedulerError::AlreadyRunning { .. })
    ));
    assert!(!group.status()["points-gain"].running);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(group.stop_worker("past-event").unwrap());
    assert!(!group.stop_worker("past-event").unwrap());

    // Let the loop observe the stop and exit
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(group.status()["past-event"].last_run.is_none());

    group.start_worker("past-event").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(group.status()["past-event"].running);

    // The second run found the event already recorded
    assert_eq!(stores.point_gains.list_by_event_id(900).unwrap().len(), 2);

    assert!(matches!(
        group.stop_worker("route-cache"),
        Err(SchedulerError::UnknownWorker(_))
    ));

    group.shutdown().await;
}
