//! Repository traits decoupling workers from the storage backend
//!
//! ```text
//!   workers / credential broker / control surface
//!                      │
//!                      ▼
//!   SessionStore  AccountStore  PointGainStore  RouteStore  EventStore
//!                      │
//!            ┌─────────┴─────────┐
//!            ▼                   ▼
//!         SQLite               Mock
//! ```

use chrono::{DateTime, Utc};

use super::StorageResult;
use crate::models::{Account, EventRecord, GainRecord, GainSample, RouteRecord, Session};

/// Cached login sessions, one per username
pub trait SessionStore: Send + Sync {
    /// Session for `username` acquired at or after `not_older_than`
    fn get_cached(
        &self,
        username: &str,
        not_older_than: DateTime<Utc>,
    ) -> StorageResult<Option<Session>>;

    /// Upsert by username, replacing any previous session
    fn save(&self, session: &Session) -> StorageResult<()>;
}

/// The pool of platform accounts
pub trait AccountStore: Send + Sync {
    /// Insert, or replace the secret of an existing username
    fn create(&self, account: &Account) -> StorageResult<()>;

    fn list_usernames(&self) -> StorageResult<Vec<String>>;

    /// One account chosen uniformly at random, `None` when the pool is empty
    fn pick_random(&self) -> StorageResult<Option<Account>>;
}

/// Point-gain records keyed by (event, participant)
///
/// `points_before` is fixed at creation. `points_after` moves from null to a
/// value exactly once.
pub trait PointGainStore: Send + Sync {
    /// Insert a record; an existing (event, user) row is left untouched.
    /// Returns whether a row was inserted.
    fn create_if_absent(&self, record: &GainRecord) -> StorageResult<bool>;

    /// Set `points_after` only if it is still null. Returns whether a row changed.
    fn complete_if_pending(
        &self,
        event_id: i64,
        user_id: i64,
        points_after: i64,
    ) -> StorageResult<bool>;

    fn list_by_event_id(&self, event_id: i64) -> StorageResult<Vec<GainRecord>>;

    fn exists_for_event(&self, event_id: i64) -> StorageResult<bool> {
        Ok(!self.list_by_event_id(event_id)?.is_empty())
    }

    /// Pending records with `event_date` in `[start, end]`, oldest first
    fn list_dangling(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GainRecord>>;

    /// Completed records whose rating went up, newest first
    fn list_completed_with_gain(&self, limit: Option<usize>) -> StorageResult<Vec<GainSample>>;

    /// All records, newest event first
    fn list(&self, limit: Option<usize>, skip: usize) -> StorageResult<Vec<GainRecord>>;
}

/// Route metadata cache
pub trait RouteStore: Send + Sync {
    fn get_by_id(&self, id: i64) -> StorageResult<Option<RouteRecord>>;

    /// Insert the route, or only fill in `rating_points` if it already exists
    ///
    /// A stored row with an empty name is a placeholder and takes the
    /// descriptive fields as well.
    fn upsert_points_only(&self, route: &RouteRecord) -> StorageResult<()>;

    /// Store every field of a freshly fetched route and stamp the crawled
    /// marker. A missing `rating_points` keeps the stored one.
    fn save_crawled(&self, route: &RouteRecord, at: DateTime<Utc>) -> StorageResult<()>;

    /// Stamp the crawled marker for an id the platform does not know
    fn mark_missing(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    /// Highest id of any stored route, crawled or not
    fn max_known_id(&self) -> StorageResult<Option<i64>>;

    /// `max(id) + 1` over crawled routes, `1` when none are crawled
    fn next_uncrawled_id(&self) -> StorageResult<i64>;
}

/// Events that went through ingestion
pub trait EventStore: Send + Sync {
    /// Insert unless present. Returns whether a row was inserted.
    fn save(&self, event: &EventRecord) -> StorageResult<bool>;

    fn get_by_id(&self, id: i64) -> StorageResult<Option<EventRecord>>;
}
