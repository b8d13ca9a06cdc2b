//! SQLite implementations of the repository traits

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};

use super::repository::{AccountStore, EventStore, PointGainStore, RouteStore, SessionStore};
use super::{decode_timestamp, encode_timestamp, Database, StorageResult};
use crate::models::{Account, EventRecord, GainRecord, GainSample, RouteRecord, Session};

/// `LIMIT` argument; SQLite treats a negative limit as unbounded
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

// ============================================================================
// Sessions
// ============================================================================

pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn get_cached(
        &self,
        username: &str,
        not_older_than: DateTime<Utc>,
    ) -> StorageResult<Option<Session>> {
        let conn = self.db.lock()?;
        let row = conn
            .query_row(
                "SELECT username, sessionid, date FROM credentials
                 WHERE username = ?1 AND date >= ?2",
                params![username, encode_timestamp(not_older_than)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(username, session_id, date)| {
            Ok(Session {
                username,
                session_id,
                csrf_token: None,
                acquired_at: decode_timestamp("credentials.date", &date)?,
            })
        })
        .transpose()
    }

    fn save(&self, session: &Session) -> StorageResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            r#"
                INSERT INTO credentials (username, sessionid, date)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(username) DO UPDATE SET
                    sessionid = excluded.sessionid,
                    date = excluded.date
                "#,
            params![
                session.username,
                session.session_id,
                encode_timestamp(session.acquired_at)
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// Accounts
// ============================================================================

pub struct SqliteAccountStore {
    db: Database,
}

impl SqliteAccountStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl AccountStore for SqliteAccountStore {
    fn create(&self, account: &Account) -> StorageResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            r#"
                INSERT INTO accounts (username, secret) VALUES (?1, ?2)
                ON CONFLICT(username) DO UPDATE SET secret = excluded.secret
                "#,
            params![account.username, account.secret],
        )?;
        Ok(())
    }

    fn list_usernames(&self) -> StorageResult<Vec<String>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT username FROM accounts ORDER BY username")?;
        let usernames = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(usernames)
    }

    fn pick_random(&self) -> StorageResult<Option<Account>> {
        let conn = self.db.lock()?;
        let account = conn
            .query_row(
                "SELECT username, secret FROM accounts ORDER BY RANDOM() LIMIT 1",
                [],
                |row| {
                    Ok(Account {
                        username: row.get(0)?,
                        secret: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }
}

// ============================================================================
// Point gains
// ============================================================================

const GAIN_COLUMNS: &str = "eventId, userId, routePoints, pointsBefore, pointsAfter, eventDate";

struct GainRow {
    event_id: i64,
    user_id: i64,
    route_points: i64,
    points_before: i64,
    points_after: Option<i64>,
    event_date: String,
}

impl GainRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            user_id: row.get(1)?,
            route_points: row.get(2)?,
            points_before: row.get(3)?,
            points_after: row.get(4)?,
            event_date: row.get(5)?,
        })
    }

    fn into_record(self) -> StorageResult<GainRecord> {
        Ok(GainRecord {
            event_id: self.event_id,
            user_id: self.user_id,
            route_points: self.route_points,
            points_before: self.points_before,
            points_after: self.points_after,
            event_date: decode_timestamp("pointsGain.eventDate", &self.event_date)?,
        })
    }
}

fn query_gains<P: Params>(conn: &Connection, sql: &str, params: P) -> StorageResult<Vec<GainRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, GainRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(GainRow::into_record).collect()
}

pub struct SqlitePointGainStore {
    db: Database,
}

impl SqlitePointGainStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl PointGainStore for SqlitePointGainStore {
    fn create_if_absent(&self, record: &GainRecord) -> StorageResult<bool> {
        let conn = self.db.lock()?;
        let inserted = conn.execute(
            r#"
                INSERT INTO pointsGain
                    (eventId, userId, routePoints, pointsBefore, pointsAfter, eventDate)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(eventId, userId) DO NOTHING
                "#,
            params![
                record.event_id,
                record.user_id,
                record.route_points,
                record.points_before,
                record.points_after,
                encode_timestamp(record.event_date)
            ],
        )?;
        Ok(inserted > 0)
    }

    fn complete_if_pending(
        &self,
        event_id: i64,
        user_id: i64,
        points_after: i64,
    ) -> StorageResult<bool> {
        let conn = self.db.lock()?;
        let updated = conn.execute(
            "UPDATE pointsGain SET pointsAfter = ?1
             WHERE eventId = ?2 AND userId = ?3 AND pointsAfter IS NULL",
            params![points_after, event_id, user_id],
        )?;
        Ok(updated > 0)
    }

    fn list_by_event_id(&self, event_id: i64) -> StorageResult<Vec<GainRecord>> {
        let conn = self.db.lock()?;
        query_gains(
            &conn,
            &format!("SELECT {GAIN_COLUMNS} FROM pointsGain WHERE eventId = ?1 ORDER BY userId"),
            params![event_id],
        )
    }

    fn exists_for_event(&self, event_id: i64) -> StorageResult<bool> {
        let conn = self.db.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pointsGain WHERE eventId = ?1)",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn list_dangling(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<GainRecord>> {
        let conn = self.db.lock()?;
        query_gains(
            &conn,
            &format!(
                "SELECT {GAIN_COLUMNS} FROM pointsGain
                 WHERE pointsAfter IS NULL AND eventDate >= ?1 AND eventDate <= ?2
                 ORDER BY eventDate, eventId, userId"
            ),
            params![encode_timestamp(start), encode_timestamp(end)],
        )
    }

    fn list_completed_with_gain(&self, limit: Option<usize>) -> StorageResult<Vec<GainSample>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT routePoints, pointsBefore, pointsAfter FROM pointsGain
             WHERE pointsAfter IS NOT NULL AND pointsBefore < pointsAfter
             ORDER BY eventDate DESC
             LIMIT ?1",
        )?;
        let samples = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok(GainSample {
                    route_points: row.get(0)?,
                    points_before: row.get(1)?,
                    points_after: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    fn list(&self, limit: Option<usize>, skip: usize) -> StorageResult<Vec<GainRecord>> {
        let conn = self.db.lock()?;
        query_gains(
            &conn,
            &format!(
                "SELECT {GAIN_COLUMNS} FROM pointsGain
                 ORDER BY eventDate DESC, eventId, userId
                 LIMIT ?1 OFFSET ?2"
            ),
            params![sql_limit(limit), skip as i64],
        )
    }
}

// ============================================================================
// Routes
// ============================================================================

pub struct SqliteRouteStore {
    db: Database,
}

impl SqliteRouteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl RouteStore for SqliteRouteStore {
    fn get_by_id(&self, id: i64) -> StorageResult<Option<RouteRecord>> {
        let conn = self.db.lock()?;
        let route = conn
            .query_row(
                "SELECT id, name, elevation, distance, scale, points FROM routes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RouteRecord {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        elevation: row.get(2)?,
                        distance: row.get(3)?,
                        scale: row.get(4)?,
                        rating_points: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(route)
    }

    fn upsert_points_only(&self, route: &RouteRecord) -> StorageResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            r#"
                INSERT INTO routes (id, points, elevation, name, scale, distance)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    points = COALESCE(excluded.points, routes.points),
                    elevation = CASE WHEN routes.name = '' THEN excluded.elevation ELSE routes.elevation END,
                    scale = CASE WHEN routes.name = '' THEN excluded.scale ELSE routes.scale END,
                    distance = CASE WHEN routes.name = '' THEN excluded.distance ELSE routes.distance END,
                    name = CASE WHEN routes.name = '' THEN excluded.name ELSE routes.name END
                "#,
            params![
                route.id,
                route.rating_points,
                route.elevation,
                route.title,
                route.scale,
                route.distance
            ],
        )?;
        Ok(())
    }

    fn save_crawled(&self, route: &RouteRecord, at: DateTime<Utc>) -> StorageResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            r#"
                INSERT INTO routes (id, points, elevation, name, scale, distance, crawledAt)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    points = COALESCE(excluded.points, routes.points),
                    elevation = excluded.elevation,
                    name = excluded.name,
                    scale = excluded.scale,
                    distance = excluded.distance,
                    crawledAt = excluded.crawledAt
                "#,
            params![
                route.id,
                route.rating_points,
                route.elevation,
                route.title,
                route.scale,
                route.distance,
                encode_timestamp(at)
            ],
        )?;
        Ok(())
    }

    fn mark_missing(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let conn = self.db.lock()?;
        conn.execute(
            r#"
                INSERT INTO routes (id, crawledAt) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET crawledAt = excluded.crawledAt
                "#,
            params![id, encode_timestamp(at)],
        )?;
        Ok(())
    }

    fn max_known_id(&self) -> StorageResult<Option<i64>> {
        let conn = self.db.lock()?;
        let max = conn.query_row("SELECT MAX(id) FROM routes", [], |row| row.get(0))?;
        Ok(max)
    }

    fn next_uncrawled_id(&self) -> StorageResult<i64> {
        let conn = self.db.lock()?;
        let next = conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM routes WHERE crawledAt IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}

// ============================================================================
// Events
// ============================================================================

pub struct SqliteEventStore {
    db: Database,
}

impl SqliteEventStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl EventStore for SqliteEventStore {
    fn save(&self, event: &EventRecord) -> StorageResult<bool> {
        let conn = self.db.lock()?;
        let inserted = conn.execute(
            r#"
                INSERT INTO events (id, title, routeId, points, organizerId)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
                "#,
            params![
                event.id,
                event.title,
                event.route_id,
                event.points,
                event.organizer_id
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_by_id(&self, id: i64) -> StorageResult<Option<EventRecord>> {
        let conn = self.db.lock()?;
        let event = conn
            .query_row(
                "SELECT id, title, routeId, points, organizerId FROM events WHERE id = ?1",
                params![id],
                |row| {
                    Ok(EventRecord {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        route_id: row.get(2)?,
                        points: row.get(3)?,
                        organizer_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(event)
    }
}
