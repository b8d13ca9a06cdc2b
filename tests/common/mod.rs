//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use trailgain::credentials::{AccountPool, CredentialBroker};
use trailgain::error::Result;
use trailgain::models::{Account, ActivityKind, CycleReport, Event, RouteRecord, RouteSummary, Session};
use trailgain::platform::SharedPlatformClient;
use trailgain::scheduler::{UnitOfWork, Worker, WorkerContext};
use trailgain::storage::{Database, Stores};

/// Fixed clock for tests that drive workers with an explicit `now`
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 20, 30, 0).unwrap()
}

/// Stores over a fresh in-memory SQLite database
pub fn sqlite_stores() -> Stores {
    let db = Database::in_memory().expect("in-memory database");
    Stores::sqlite(&db)
}

/// Broker over `stores` with a single account named alice
pub fn broker_with_alice(stores: &Stores, client: SharedPlatformClient) -> Arc<CredentialBroker> {
    let pool = AccountPool::new(stores.accounts.clone());
    pool.add(&Account::new("alice", "hunter2")).expect("add account");
    Arc::new(CredentialBroker::new(pool, stores.sessions.clone(), client))
}

pub fn session() -> Session {
    Session::new("alice", "session-alice").with_acquired_at(fixed_now())
}

pub fn hiking_event(id: i64, route_id: i64, start_time: DateTime<Utc>) -> Event {
    Event {
        id,
        title: format!("Hike {id}"),
        activity: ActivityKind::Hiking,
        route: RouteSummary {
            id: route_id,
            title: format!("Route {route_id}"),
            elevation: 1200,
            distance: 14.0,
            scale: "T3".to_string(),
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
        elevation: 1200,
        distance: 14.0,
        scale: "T3".to_string(),
        rating_points,
    }
}

/// Unit of work that does nothing
pub struct IdleUnit;

#[async_trait]
impl UnitOfWork for IdleUnit {
    async fn run(&self, _ctx: &WorkerContext<'_>) -> Result<CycleReport> {
        Ok(CycleReport::default())
    }
}

/// Never-started worker that owns the contexts handed to workers under test
pub fn host_worker(broker: Arc<CredentialBroker>) -> Worker {
    Worker::new("host", Duration::from_secs(3600), Arc::new(IdleUnit), broker)
}
