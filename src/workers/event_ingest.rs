//! Records every participant's rating before a concluded hiking event

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{IngestConfig, IngestGuard};
use crate::error::Result;
use crate::metrics;
use crate::models::{CycleReport, Event, EventRecord, GainRecord, RouteRecord, Session};
use crate::platform::SharedPlatformClient;
use crate::scheduler::{UnitOfWork, WorkerContext};
use crate::storage::{EventStore, PointGainStore, RouteStore, Stores};
use crate::utils::error::{FetchError, PlatformError};

/// Discovers past events and creates pending gain records
///
/// Report units: `processed` counts gain records created, `skipped` counts
/// events (or participants, with the participant guard) left out by a filter,
/// `failed` counts events or participants whose lookup or write failed and
/// `abandoned` counts events left untouched after a stop request.
pub struct EventIngestWorker {
    client: SharedPlatformClient,
    gains: Arc<dyn PointGainStore>,
    routes: Arc<dyn RouteStore>,
    events: Arc<dyn EventStore>,
    config: IngestConfig,
}

impl EventIngestWorker {
    pub const NAME: &'static str = "past-event";

    pub fn new(client: SharedPlatformClient, stores: &Stores, config: IngestConfig) -> Self {
        Self {
            client,
            gains: stores.point_gains.clone(),
            routes: stores.routes.clone(),
            events: stores.events.clone(),
            config,
        }
    }

    /// One ingestion pass as seen at `now`
    pub async fn ingest_at(
        &self,
        ctx: &WorkerContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let events = self.client.list_past_events(ctx.session).await?;
        let oldest = now - chrono::Duration::hours(i64::from(self.config.max_event_age_hours));
        info!(count = events.len(), "Fetched past events");

        let mut report = CycleReport::default();
        let total = events.len();

        for (index, event) in events.iter().enumerate() {
            if ctx.should_stop() {
                report.abandoned = total - index;
                info!(
                    abandoned = report.abandoned,
                    "Stop requested, abandoning remaining events"
                );
                break;
            }

            if !event.is_hiking() {
                debug!(event_id = event.id, activity = %event.activity, "Skipping non-hiking event");
                report.skipped += 1;
                continue;
            }

            if event.start_time < oldest {
                debug!(event_id = event.id, start = %event.start_time, "Skipping event, too old for a before value");
                report.skipped += 1;
                continue;
            }

            match self.ingest_event(ctx.session, event).await {
                Ok(event_report) => report.merge(event_report),
                Err(e) => {
                    warn!(event_id = event.id, error = %e, "Failed to ingest event");
                    report.failed += 1;
                }
            }
        }

        metrics::record_gains_created(report.processed as u64);
        Ok(report)
    }

    async fn ingest_event(&self, session: &Session, event: &Event) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let recorded: HashSet<i64> = match self.config.guard {
            IngestGuard::Event => {
                if self.gains.exists_for_event(event.id)? {
                    debug!(event_id = event.id, "Event already recorded");
                    report.skipped += 1;
                    return Ok(report);
                }
                HashSet::new()
            }
            IngestGuard::Participant => self
                .gains
                .list_by_event_id(event.id)?
                .into_iter()
                .map(|r| r.user_id)
                .collect(),
        };

        let route_points = self.resolve_route_points(session, event).await?;
        if let Err(e) = self
            .events
            .save(&EventRecord::from_event(event, Some(route_points)))
        {
            warn!(event_id = event.id, error = %e, "Failed to save event row");
        }

        let participants = self.client.fetch_participant_ids(session, event.id).await?;
        info!(
            event_id = event.id,
            participants = participants.len(),
            route_points,
            "Recording points before event"
        );

        for user_id in participants {
            if recorded.contains(&user_id) {
                report.skipped += 1;
                continue;
            }

            let points = match self.client.fetch_user_points(session, user_id).await {
                Ok(points) => points,
                Err(e) => {
                    warn!(event_id = event.id, user_id, error = %e, "Failed to fetch user points");
                    report.failed += 1;
                    continue;
                }
            };

            let record = GainRecord::pending(event.id, user_id, route_points, points, event.start_time);
            match self.gains.create_if_absent(&record) {
                Ok(true) => report.processed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(event_id = event.id, user_id, error = %e, "Failed to create gain record");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Cached rating of the event's route, fetched and cached on first sight
    async fn resolve_route_points(&self, session: &Session, event: &Event) -> Result<i64> {
        let route_id = event.route.id;

        if let Some(points) = self
            .routes
            .get_by_id(route_id)?
            .and_then(|route| route.rating_points)
        {
            return Ok(points);
        }

        let fetched = self.client.fetch_route_details(session, route_id).await?;
        let Some(points) = fetched.rating_points else {
            return Err(PlatformError::from(FetchError::parse(
                "route rating",
                format!("route {route_id} has no rating"),
            ))
            .into());
        };

        let record = RouteRecord {
            rating_points: Some(points),
            ..RouteRecord::from(&event.route)
        };
        self.routes.upsert_points_only(&record)?;
        debug!(route_id, points, "Cached route rating");

        Ok(points)
    }
}

#[async_trait]
impl UnitOfWork for EventIngestWorker {
    async fn run(&self, ctx: &WorkerContext<'_>) -> Result<CycleReport> {
        self.ingest_at(ctx, Utc::now()).await
    }
}
