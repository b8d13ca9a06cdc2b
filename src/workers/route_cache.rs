//! Backfills route metadata one id per cycle

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics;
use crate::models::CycleReport;
use crate::platform::SharedPlatformClient;
use crate::scheduler::{UnitOfWork, WorkerContext};
use crate::storage::{RouteStore, Stores};

pub struct RouteCacheWorker {
    client: SharedPlatformClient,
    routes: Arc<dyn RouteStore>,
}

impl RouteCacheWorker {
    pub const NAME: &'static str = "route-cache";

    pub fn new(client: SharedPlatformClient, stores: &Stores) -> Self {
        Self {
            client,
            routes: stores.routes.clone(),
        }
    }

    /// Fetch and store the route following the highest crawled id
    ///
    /// A 404 below the highest stored id is a gap and gets stamped as
    /// crawled so the backfill moves past it. A 404 at or past that id is
    /// the end of the published routes; nothing is written and the same id
    /// is asked for again next cycle. Other failures also leave the marker
    /// alone.
    pub async fn cache_next_at(
        &self,
        ctx: &WorkerContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let route_id = self.routes.next_uncrawled_id()?;
        debug!(route_id, "Fetching route details");

        let mut report = CycleReport::default();
        match self.client.fetch_route_details(ctx.session, route_id).await {
            Ok(route) => {
                self.routes.save_crawled(&route, now)?;
                metrics::record_route_cached();
                info!(route_id, title = %route.title, points = ?route.rating_points, "Route cached");
                report.processed = 1;
            }
            Err(e) if e.is_not_found() => {
                let known_above = self.routes.max_known_id()?.is_some_and(|max| max > route_id);
                if known_above {
                    self.routes.mark_missing(route_id, now)?;
                    info!(route_id, "Route does not exist, marked as crawled");
                } else {
                    debug!(route_id, "Route not published yet, retrying next cycle");
                }
                report.skipped = 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(report)
    }
}

#[async_trait]
impl UnitOfWork for RouteCacheWorker {
    async fn run(&self, ctx: &WorkerContext<'_>) -> Result<CycleReport> {
        self.cache_next_at(ctx, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatformClient;
    use crate::workers::testing::{idle_worker, now, route, session};

    #[tokio::test]
    async fn test_backfill_starts_at_one_and_advances() {
        let client = Arc::new(
            MockPlatformClient::new()
                .with_route(route(1, Some(100)))
                .with_route(route(2, Some(200))),
        );
        let stores = Stores::mock();
        let worker = RouteCacheWorker::new(client, &stores);
        let host = idle_worker();
        let session = session();
        let ctx = WorkerContext::new(&host, &session);

        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 1);
        let report = worker.cache_next_at(&ctx, now()).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 2);

        worker.cache_next_at(&ctx, now()).await.unwrap();
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 3);
        assert_eq!(stores.routes.get_by_id(2).unwrap().unwrap().rating_points, Some(200));
    }

    #[tokio::test]
    async fn test_gap_below_known_route_is_tombstoned() {
        let client = Arc::new(MockPlatformClient::new().with_route(route(2, Some(200))));
        let stores = Stores::mock();
        // Ingestion already saw route 2
        stores.routes.upsert_points_only(&route(2, Some(200))).unwrap();
        let worker = RouteCacheWorker::new(client, &stores);
        let host = idle_worker();
        let session = session();
        let ctx = WorkerContext::new(&host, &session);

        let report = worker.cache_next_at(&ctx, now()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 2);

        worker.cache_next_at(&ctx, now()).await.unwrap();
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_end_of_published_routes_is_retried() {
        let client = Arc::new(
            MockPlatformClient::new()
                .with_route(route(1, Some(100)))
                .with_route(route(2, Some(200))),
        );
        let stores = Stores::mock();
        let worker = RouteCacheWorker::new(client.clone(), &stores);
        let host = idle_worker();
        let session = session();
        let ctx = WorkerContext::new(&host, &session);

        for _ in 0..6 {
            worker.cache_next_at(&ctx, now()).await.unwrap();
        }
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 3);
        assert!(stores.routes.get_by_id(3).unwrap().is_none());
        assert_eq!(stores.routes.max_known_id().unwrap(), Some(2));

        client.publish_route(route(3, Some(100)));
        let report = worker.cache_next_at(&ctx, now()).await.unwrap();

        assert_eq!(report.processed, 1);
        let stored = stores.routes.get_by_id(3).unwrap().unwrap();
        assert_eq!(stored.rating_points, Some(100));
        assert_eq!(stored.title, "Route 3");
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_crawl_keeps_known_rating() {
        let client = Arc::new(MockPlatformClient::new().with_route(route(1, None)));
        let stores = Stores::mock();
        stores.routes.upsert_points_only(&route(1, Some(300))).unwrap();
        let worker = RouteCacheWorker::new(client, &stores);
        let host = idle_worker();
        let session = session();
        let ctx = WorkerContext::new(&host, &session);

        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 1);
        worker.cache_next_at(&ctx, now()).await.unwrap();

        assert_eq!(stores.routes.get_by_id(1).unwrap().unwrap().rating_points, Some(300));
        assert_eq!(stores.routes.next_uncrawled_id().unwrap(), 2);
    }
}
