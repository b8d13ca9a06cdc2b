//! Ingest → reconcile → export flow over SQLite

use chrono::Duration;
use std::sync::Arc;

use trailgain::config::{IngestConfig, IngestGuard, ReconcileConfig};
use trailgain::platform::MockPlatformClient;
use trailgain::scheduler::WorkerContext;
use trailgain::workers::{EventIngestWorker, GainReconciliationWorker, RouteCacheWorker};

use crate::common::{
    broker_with_alice, fixed_now, hiking_event, host_worker, route, session, sqlite_stores,
};

fn scenario_client() -> MockPlatformClient {
    MockPlatformClient::new()
        .with_events(vec![hiking_event(501, 10, fixed_now() - Duration::hours(1))])
        .with_participants(501, vec![7, 8])
        .with_points(7, 120)
        .with_points(8, 95)
        .with_route(route(10, Some(300)))
}

// ============================================================================
// Full Lifecycle
// ============================================================================

#[tokio::test]
async fn test_gain_lifecycle_on_sqlite() {
    let client = Arc::new(scenario_client());
    let stores = sqlite_stores();
    let host = host_worker(broker_with_alice(&stores, client.clone()));
    let session = session();
    let ctx = WorkerContext::new(&host, &session);

    let ingest = EventIngestWorker::new(client.clone(), &stores, IngestConfig::default());
    let reconcile = GainReconciliationWorker::new(client.clone(), &stores, ReconcileConfig::default());

    // Discovery records the rating before the event
    let report = ingest.ingest_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(report.processed, 2);

    let mut records = stores.point_gains.list_by_event_id(501).unwrap();
    records.sort_by_key(|r| r.user_id);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.route_points == 300 && r.is_dangling()));
    assert_eq!(records[0].points_before, 120);
    assert_eq!(records[1].points_before, 95);

    let event_row = stores.events.get_by_id(501).unwrap().unwrap();
    assert_eq!(event_row.points, Some(300));
    assert_eq!(event_row.route_id, 10);

    // Too early: the platform has not finalised the ratings yet
    let early = reconcile.reconcile_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(early.processed, 0);

    // 73 hours later the event falls inside the window
    client.set_points(7, 140);
    client.set_points(8, 99);
    let later = fixed_now() + Duration::hours(73);
    let report = reconcile.reconcile_at(&ctx, later).await.unwrap();
    assert_eq!(report.processed, 2);

    let mut records = stores.point_gains.list_by_event_id(501).unwrap();
    records.sort_by_key(|r| r.user_id);
    assert_eq!(records[0].points_after, Some(140));
    assert_eq!(records[1].points_after, Some(99));
    assert_eq!(records[0].gain(), Some(20));

    // A completed record is never revisited
    client.set_points(7, 500);
    let again = reconcile.reconcile_at(&ctx, later).await.unwrap();
    assert_eq!(again.processed, 0);
    let record = stores
        .point_gains
        .list_by_event_id(501)
        .unwrap()
        .into_iter()
        .find(|r| r.user_id == 7)
        .unwrap();
    assert_eq!(record.points_after, Some(140));

    // Re-discovery leaves the before values alone
    let rerun = ingest.ingest_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(rerun.processed, 0);
    assert_eq!(rerun.skipped, 1);
    assert_eq!(stores.point_gains.list_by_event_id(501).unwrap().len(), 2);

    let samples = stores.point_gains.list_completed_with_gain(None).unwrap();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.route_points == 300));
}

#[tokio::test]
async fn test_route_rating_fetched_once_for_shared_route() {
    let client = Arc::new(
        MockPlatformClient::new()
            .with_events(vec![
                hiking_event(1, 10, fixed_now() - Duration::hours(2)),
                hiking_event(2, 10, fixed_now() - Duration::hours(1)),
            ])
            .with_participants(1, vec![7])
            .with_participants(2, vec![8])
            .with_points(7, 50)
            .with_points(8, 60)
            .with_route(route(10, Some(250))),
    );
    let stores = sqlite_stores();
    let host = host_worker(broker_with_alice(&stores, client.clone()));
    let session = session();
    let ctx = WorkerContext::new(&host, &session);

    let ingest = EventIngestWorker::new(client.clone(), &stores, IngestConfig::default());
    let report = ingest.ingest_at(&ctx, fixed_now()).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(client.route_fetch_count(), 1);
    assert_eq!(
        stores.routes.get_by_id(10).unwrap().unwrap().rating_points,
        Some(250)
    );
    // Caching a rating during ingestion does not count as a backfill crawl
    assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 1);
}

#[tokio::test]
async fn test_participant_guard_fills_gaps_on_sqlite() {
    let client = Arc::new(
        MockPlatformClient::new()
            .with_events(vec![hiking_event(501, 10, fixed_now() - Duration::hours(1))])
            .with_participants(501, vec![7, 8])
            .with_points(7, 120)
            .with_route(route(10, Some(300))),
    );
    let stores = sqlite_stores();
    let host = host_worker(broker_with_alice(&stores, client.clone()));
    let session = session();
    let ctx = WorkerContext::new(&host, &session);

    let config = IngestConfig {
        guard: IngestGuard::Participant,
        ..Default::default()
    };
    let ingest = EventIngestWorker::new(client.clone(), &stores, config);

    // User 8's profile is unavailable on the first pass
    let first = ingest.ingest_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.failed, 1);

    client.set_points(8, 95);
    let second = ingest.ingest_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.skipped, 1);

    let records = stores.point_gains.list_by_event_id(501).unwrap();
    assert_eq!(records.len(), 2);
}

// ============================================================================
// Route Backfill
// ============================================================================

#[tokio::test]
async fn test_route_backfill_walks_past_gaps() {
    let client = Arc::new(
        MockPlatformClient::new()
            .with_route(route(1, Some(100)))
            .with_route(route(3, None)),
    );
    let stores = sqlite_stores();
    let host = host_worker(broker_with_alice(&stores, client.clone()));
    let session = session();
    let ctx = WorkerContext::new(&host, &session);
    let backfill = RouteCacheWorker::new(client.clone(), &stores);
    // Ingestion already saw route 3
    stores.routes.upsert_points_only(&route(3, None)).unwrap();

    let first = backfill.cache_next_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(first.processed, 1);

    // Route 2 does not exist and is stamped so the next cycle moves on
    let second = backfill.cache_next_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 3);

    let third = backfill.cache_next_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(third.processed, 1);
    assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 4);

    assert_eq!(
        stores.routes.get_by_id(1).unwrap().unwrap().rating_points,
        Some(100)
    );
    assert_eq!(stores.routes.get_by_id(3).unwrap().unwrap().rating_points, None);

    // Past the last route nothing is written until the platform publishes more
    let fourth = backfill.cache_next_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(fourth.skipped, 1);
    assert!(stores.routes.get_by_id(4).unwrap().is_none());

    client.publish_route(route(4, Some(180)));
    let fifth = backfill.cache_next_at(&ctx, fixed_now()).await.unwrap();
    assert_eq!(fifth.processed, 1);
    assert_eq!(
        stores.routes.get_by_id(4).unwrap().unwrap().rating_points,
        Some(180)
    );
    assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 5);
}
