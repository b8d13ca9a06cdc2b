//! Scripted platform client for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::PlatformClient;
use crate::models::{Account, Event, RouteRecord, Session};
use crate::utils::error::{FetchError, PlatformError};

type PointsHook = Arc<dyn Fn(i64) + Send + Sync>;

/// Platform client answering from in-memory tables
///
/// Unknown users, events and routes answer with `NotFound`.
#[derive(Default)]
pub struct MockPlatformClient {
    events: RwLock<Vec<Event>>,
    list_fails: RwLock<bool>,
    participants: RwLock<HashMap<i64, Vec<i64>>>,
    points: RwLock<HashMap<i64, i64>>,
    routes: RwLock<HashMap<i64, RouteRecord>>,
    rejected_users: RwLock<Vec<String>>,
    on_points_fetch: RwLock<Option<PointsHook>>,
    logins: AtomicUsize,
    login_usernames: Mutex<Vec<String>>,
    points_fetches: AtomicUsize,
    route_fetches: AtomicUsize,
}

impl MockPlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(self, events: Vec<Event>) -> Self {
        if let Ok(mut guard) = self.events.write() {
            *guard = events;
        }
        self
    }

    pub fn with_participants(self, event_id: i64, user_ids: Vec<i64>) -> Self {
        if let Ok(mut guard) = self.participants.write() {
            guard.insert(event_id, user_ids);
        }
        self
    }

    pub fn with_points(self, user_id: i64, points: i64) -> Self {
        self.set_points(user_id, points);
        self
    }

    pub fn with_route(self, route: RouteRecord) -> Self {
        self.publish_route(route);
        self
    }

    /// Make `list_past_events` fail
    pub fn with_failing_event_list(self) -> Self {
        if let Ok(mut guard) = self.list_fails.write() {
            *guard = true;
        }
        self
    }

    /// Make logins of `username` fail
    pub fn rejecting_login(self, username: &str) -> Self {
        if let Ok(mut guard) = self.rejected_users.write() {
            guard.push(username.to_string());
        }
        self
    }

    /// Run `hook` with the user id before every points lookup
    pub fn on_points_fetch(self, hook: impl Fn(i64) + Send + Sync + 'static) -> Self {
        if let Ok(mut guard) = self.on_points_fetch.write() {
            *guard = Some(Arc::new(hook));
        }
        self
    }

    pub fn set_points(&self, user_id: i64, points: i64) {
        if let Ok(mut guard) = self.points.write() {
            guard.insert(user_id, points);
        }
    }

    /// Make a route available after construction
    pub fn publish_route(&self, route: RouteRecord) {
        if let Ok(mut guard) = self.routes.write() {
            guard.insert(route.id, route);
        }
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logged_in_usernames(&self) -> Vec<String> {
        self.login_usernames
            .lock()
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    pub fn points_fetch_count(&self) -> usize {
        self.points_fetches.load(Ordering::SeqCst)
    }

    pub fn route_fetch_count(&self) -> usize {
        self.route_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn login(&self, account: &Account) -> Result<Session, PlatformError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut names) = self.login_usernames.lock() {
            names.push(account.username.clone());
        }

        let rejected = self
            .rejected_users
            .read()
            .map(|users| users.contains(&account.username))
            .unwrap_or(false);
        if rejected {
            return Err(PlatformError::auth(format!(
                "invalid credentials for {}",
                account.username
            )));
        }

        let n = self.login_count();
        Ok(Session::new(
            account.username.clone(),
            format!("session-{}-{n}", account.username),
        ))
    }

    async fn list_past_events(&self, _session: &Session) -> Result<Vec<Event>, PlatformError> {
        if self.list_fails.read().map(|f| *f).unwrap_or(false) {
            return Err(PlatformError::structural("event list unavailable"));
        }
        Ok(self
            .events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default())
    }

    async fn fetch_participant_ids(
        &self,
        _session: &Session,
        event_id: i64,
    ) -> Result<Vec<i64>, PlatformError> {
        let participants = self
            .participants
            .read()
            .ok()
            .and_then(|p| p.get(&event_id).cloned());
        let Some(ids) = participants else {
            return Err(FetchError::NotFound(format!("event {event_id}")).into());
        };

        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Ok(unique)
    }

    async fn fetch_user_points(
        &self,
        _session: &Session,
        user_id: i64,
    ) -> Result<i64, PlatformError> {
        self.points_fetches.fetch_add(1, Ordering::SeqCst);

        let hook = self.on_points_fetch.read().ok().and_then(|h| h.clone());
        if let Some(hook) = hook {
            hook(user_id);
        }

        self.points
            .read()
            .ok()
            .and_then(|p| p.get(&user_id).copied())
            .ok_or_else(|| FetchError::NotFound(format!("user {user_id}")).into())
    }

    async fn fetch_route_details(
        &self,
        _session: &Session,
        route_id: i64,
    ) -> Result<RouteRecord, PlatformError> {
        self.route_fetches.fetch_add(1, Ordering::SeqCst);
        self.routes
            .read()
            .ok()
            .and_then(|r| r.get(&route_id).cloned())
            .ok_or_else(|| FetchError::NotFound(format!("route {route_id}")).into())
    }
}
