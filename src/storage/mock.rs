//! In-memory implementations of the repository traits
//!
//! Useful for testing without database dependencies. They follow the same
//! conflict and guard rules as the SQLite stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;

use super::repository::{AccountStore, EventStore, PointGainStore, RouteStore, SessionStore};
use super::{StorageError, StorageResult};
use crate::models::{Account, EventRecord, GainRecord, GainSample, RouteRecord, Session};

fn read<T>(lock: &RwLock<T>) -> StorageResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::Poisoned)
}

fn write<T>(lock: &RwLock<T>) -> StorageResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::Poisoned)
}

fn page<T>(items: impl Iterator<Item = T>, limit: Option<usize>, skip: usize) -> Vec<T> {
    let items = items.skip(skip);
    match limit {
        Some(limit) => items.take(limit).collect(),
        None => items.collect(),
    }
}

#[derive(Default)]
pub struct MockSessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MockSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MockSessionStore {
    fn get_cached(
        &self,
        username: &str,
        not_older_than: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let sessions = read(&self.sessions)?;
        Ok(sessions
            .get(username)
            .filter(|s| s.acquired_at >= not_older_than)
            .cloned())
    }

    fn save(&self, session: &Session) -> StorageResult<()> {
        write(&self.sessions)?.insert(session.username.clone(), session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAccountStore {
    accounts: RwLock<BTreeMap<String, String>>,
}

impl MockAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.accounts.write() {
            map.extend(accounts.into_iter().map(|a| (a.username, a.secret)));
        }
        store
    }
}

impl AccountStore for MockAccountStore {
    fn create(&self, account: &Account) -> StorageResult<()> {
        write(&self.accounts)?.insert(account.username.clone(), account.secret.clone());
        Ok(())
    }

    fn list_usernames(&self) -> StorageResult<Vec<String>> {
        Ok(read(&self.accounts)?.keys().cloned().collect())
    }

    fn pick_random(&self) -> StorageResult<Option<Account>> {
        let accounts = read(&self.accounts)?;
        Ok(accounts
            .iter()
            .choose(&mut rand::thread_rng())
            .map(|(username, secret)| Account::new(username.clone(), secret.clone())))
    }
}

#[derive(Default)]
pub struct MockPointGainStore {
    records: RwLock<BTreeMap<(i64, i64), GainRecord>>,
}

impl MockPointGainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_newest_first(records: &BTreeMap<(i64, i64), GainRecord>) -> Vec<GainRecord> {
        let mut all: Vec<GainRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| {
            b.event_date
                .cmp(&a.event_date)
                .then(a.event_id.cmp(&b.event_id))
                .then(a.user_id.cmp(&b.user_id))
        });
        all
    }
}

impl PointGainStore for MockPointGainStore {
    fn create_if_absent(&self, record: &GainRecord) -> StorageResult<bool> {
        let mut records = write(&self.records)?;
        let key = (record.event_id, record.user_id);
        if records.contains_key(&key) {
            return Ok(false);
        }
        records.insert(key, record.clone());
        Ok(true)
    }

    fn complete_if_pending(
        &self,
        event_id: i64,
        user_id: i64,
        points_after: i64,
    ) -> StorageResult<bool> {
        let mut records = write(&self.records)?;
        match records.get_mut(&(event_id, user_id)) {
            Some(record) if record.points_after.is_none() => {
                record.points_after = Some(points_after);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_by_event_id(&self, event_id: i64) -> StorageResult<Vec<GainRecord>> {
        let records = read(&self.records)?;
        Ok(records
            .range((event_id, i64::MIN)..=(event_id, i64::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn list_dangling(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GainRecord>> {
        let records = read(&self.records)?;
        let mut dangling: Vec<GainRecord> = records
            .values()
            .filter(|r| r.is_dangling() && r.event_date >= start && r.event_date <= end)
            .cloned()
            .collect();
        dangling.sort_by(|a, b| {
            a.event_date
                .cmp(&b.event_date)
                .then(a.event_id.cmp(&b.event_id))
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(dangling)
    }

    fn list_completed_with_gain(&self, limit: Option<usize>) -> StorageResult<Vec<GainSample>> {
        let records = read(&self.records)?;
        let samples = Self::sorted_newest_first(&records)
            .into_iter()
            .filter_map(|r| match r.points_after {
                Some(after) if r.points_before < after => Some(GainSample {
                    route_points: r.route_points,
                    points_before: r.points_before,
                    points_after: after,
                }),
                _ => None,
            });
        Ok(page(samples, limit, 0))
    }

    fn list(&self, limit: Option<usize>, skip: usize) -> StorageResult<Vec<GainRecord>> {
        let records = read(&self.records)?;
        Ok(page(
            Self::sorted_newest_first(&records).into_iter(),
            limit,
            skip,
        ))
    }
}

#[derive(Default)]
pub struct MockRouteStore {
    routes: RwLock<HashMap<i64, (RouteRecord, Option<DateTime<Utc>>)>>,
}

impl MockRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the route was last marked crawled
    pub fn crawled_at(&self, id: i64) -> Option<DateTime<Utc>> {
        self.routes
            .read()
            .ok()
            .and_then(|routes| routes.get(&id).and_then(|(_, at)| *at))
    }

    fn with_route<F>(&self, route: &RouteRecord, update: F) -> StorageResult<()>
    where
        F: FnOnce(&mut RouteRecord, &mut Option<DateTime<Utc>>),
    {
        let mut routes = write(&self.routes)?;
        let (existing, crawled_at) = routes
            .entry(route.id)
            .or_insert_with(|| (route.clone(), None));
        update(existing, crawled_at);
        Ok(())
    }
}

impl RouteStore for MockRouteStore {
    fn get_by_id(&self, id: i64) -> StorageResult<Option<RouteRecord>> {
        Ok(read(&self.routes)?.get(&id).map(|(r, _)| r.clone()))
    }

    fn upsert_points_only(&self, route: &RouteRecord) -> StorageResult<()> {
        self.with_route(route, |existing, _| {
            let points = route.rating_points.or(existing.rating_points);
            if existing.title.is_empty() {
                *existing = route.clone();
            }
            existing.rating_points = points;
        })
    }

    fn save_crawled(&self, route: &RouteRecord, at: DateTime<Utc>) -> StorageResult<()> {
        self.with_route(route, |existing, crawled_at| {
            let points = route.rating_points.or(existing.rating_points);
            *existing = route.clone();
            existing.rating_points = points;
            *crawled_at = Some(at);
        })
    }

    fn mark_missing(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let placeholder = RouteRecord {
            id,
            title: String::new(),
            elevation: 0,
            distance: 0.0,
            scale: String::new(),
            rating_points: None,
        };
        self.with_route(&placeholder, |_, crawled_at| *crawled_at = Some(at))
    }

    fn max_known_id(&self) -> StorageResult<Option<i64>> {
        Ok(read(&self.routes)?.keys().max().copied())
    }

    fn next_uncrawled_id(&self) -> StorageResult<i64> {
        let routes = read(&self.routes)?;
        Ok(routes
            .iter()
            .filter(|(_, (_, at))| at.is_some())
            .map(|(id, _)| *id)
            .max()
            .map_or(1, |max| max + 1))
    }
}

#[derive(Default)]
pub struct MockEventStore {
    events: RwLock<HashMap<i64, EventRecord>>,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MockEventStore {
    fn save(&self, event: &EventRecord) -> StorageResult<bool> {
        let mut events = write(&self.events)?;
        if events.contains_key(&event.id) {
            return Ok(false);
        }
        events.insert(event.id, event.clone());
        Ok(true)
    }

    fn get_by_id(&self, id: i64) -> StorageResult<Option<EventRecord>> {
        Ok(read(&self.events)?.get(&id).cloned())
    }
}
