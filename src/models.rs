// Core data structures for the rating-gain tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform account used to log in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    #[serde(skip_serializing)]
    pub secret: String,
}

impl Account {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

/// Authenticated platform session, cached per username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub session_id: String,
    /// CSRF cookie obtained at login; not persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl Session {
    pub fn new(username: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            session_id: session_id.into(),
            csrf_token: None,
            acquired_at: Utc::now(),
        }
    }

    pub fn with_acquired_at(mut self, at: DateTime<Utc>) -> Self {
        self.acquired_at = at;
        self
    }

    /// Age of the session relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.acquired_at
    }

    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> String {
        match &self.csrf_token {
            Some(csrf) => format!("sessionid={}; csrftoken={}", self.session_id, csrf),
            None => format!("sessionid={}", self.session_id),
        }
    }
}

/// Activity tag attached to platform events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityKind {
    Hiking,
    Other(String),
}

impl ActivityKind {
    /// Platform code for hiking events
    pub const HIKING_CODE: &'static str = "HI";

    pub fn code(&self) -> &str {
        match self {
            Self::Hiking => Self::HIKING_CODE,
            Self::Other(code) => code,
        }
    }

    pub fn is_hiking(&self) -> bool {
        matches!(self, Self::Hiking)
    }
}

impl From<String> for ActivityKind {
    fn from(code: String) -> Self {
        if code.eq_ignore_ascii_case(Self::HIKING_CODE) {
            Self::Hiking
        } else {
            Self::Other(code)
        }
    }
}

impl From<&str> for ActivityKind {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<ActivityKind> for String {
    fn from(kind: ActivityKind) -> Self {
        kind.code().to_string()
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Route data embedded in an event listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteSummary {
    #[serde(rename = "route_id")]
    pub id: i64,
    #[serde(rename = "route_title", default)]
    pub title: String,
    #[serde(rename = "elevation_gain", default)]
    pub elevation: i64,
    #[serde(default)]
    pub distance: f64,
    #[serde(rename = "sac_scale", default)]
    pub scale: String,
}

/// Concluded platform event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub activity: ActivityKind,
    pub route: RouteSummary,
    pub start_time: DateTime<Utc>,
    pub participant_ids: Vec<i64>,
    pub organizer_id: Option<i64>,
}

impl Event {
    pub fn is_hiking(&self) -> bool {
        self.activity.is_hiking()
    }
}

/// Row of the `events` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub title: String,
    pub route_id: i64,
    pub points: Option<i64>,
    pub organizer_id: Option<i64>,
}

impl EventRecord {
    pub fn from_event(event: &Event, route_points: Option<i64>) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            route_id: event.route.id,
            points: route_points,
            organizer_id: event.organizer_id,
        }
    }
}

/// Cached route metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: i64,
    pub title: String,
    pub elevation: i64,
    pub distance: f64,
    pub scale: String,
    /// Filled lazily the first time the route's rating is discovered
    pub rating_points: Option<i64>,
}

impl From<&RouteSummary> for RouteRecord {
    fn from(summary: &RouteSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title.clone(),
            elevation: summary.elevation,
            distance: summary.distance,
            scale: summary.scale.clone(),
            rating_points: None,
        }
    }
}

/// Rating snapshot of one participant around one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainRecord {
    pub event_id: i64,
    pub user_id: i64,
    pub route_points: i64,
    pub points_before: i64,
    pub points_after: Option<i64>,
    pub event_date: DateTime<Utc>,
}

impl GainRecord {
    /// New pending record with no `points_after` yet
    pub fn pending(
        event_id: i64,
        user_id: i64,
        route_points: i64,
        points_before: i64,
        event_date: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            user_id,
            route_points,
            points_before,
            points_after: None,
            event_date,
        }
    }

    pub fn is_dangling(&self) -> bool {
        self.points_after.is_none()
    }

    pub fn gain(&self) -> Option<i64> {
        self.points_after.map(|after| after - self.points_before)
    }
}

/// Reduced view of a completed gain, used for model fitting exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainSample {
    pub route_points: i64,
    pub points_before: i64,
    pub points_after: i64,
}

/// Outcome counters of one worker cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Items handled successfully
    pub processed: usize,
    /// Items skipped by a filter or guard
    pub skipped: usize,
    /// Items whose processing failed
    pub failed: usize,
    /// Items left untouched because a stop was requested
    pub abandoned: usize,
}

impl CycleReport {
    pub fn merge(&mut self, other: CycleReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_kind_from_code() {
        assert_eq!(ActivityKind::from("HI"), ActivityKind::Hiking);
        assert_eq!(ActivityKind::from("hi"), ActivityKind::Hiking);
        assert_eq!(
            ActivityKind::from("SK"),
            ActivityKind::Other("SK".to_string())
        );
        assert_eq!(String::from(ActivityKind::Hiking), "HI");
    }

    #[test]
    fn test_session_cookie_header() {
        let mut session = Session::new("alice", "abc");
        assert_eq!(session.cookie_header(), "sessionid=abc");

        session.csrf_token = Some("tok".to_string());
        assert_eq!(session.cookie_header(), "sessionid=abc; csrftoken=tok");
    }

    #[test]
    fn test_session_age() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let session = Session::new("alice", "abc").with_acquired_at(at);
        let now = at + chrono::Duration::hours(2);
        assert_eq!(session.age(now), chrono::Duration::hours(2));
    }

    #[test]
    fn test_gain_record_gain() {
        let date = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut record = GainRecord::pending(1, 7, 300, 120, date);
        assert!(record.is_dangling());
        assert_eq!(record.gain(), None);

        record.points_after = Some(140);
        assert!(!record.is_dangling());
        assert_eq!(record.gain(), Some(20));
    }

    #[test]
    fn test_account_secret_not_serialized() {
        let account = Account::new("alice", "hunter2");
        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("alice"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_cycle_report_merge() {
        let mut total = CycleReport {
            processed: 1,
            ..Default::default()
        };
        total.merge(CycleReport {
            processed: 2,
            skipped: 1,
            failed: 1,
            abandoned: 3,
        });
        assert_eq!(total.processed, 3);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.failed, 1);
        assert_eq!(total.abandoned, 3);
    }
}
