//! Fills in the rating after an event once the platform has finalised it

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ReconcileConfig, ReconcileWindow};
use crate::error::Result;
use crate::metrics;
use crate::models::CycleReport;
use crate::platform::SharedPlatformClient;
use crate::scheduler::{UnitOfWork, WorkerContext};
use crate::storage::{PointGainStore, Stores};
use crate::utils::{start_of_day, truncate_to_hour};

/// Event dates whose pending records are reconciled at `now`
///
/// The window ends at `now - delay` truncated to the hour. With
/// [`ReconcileWindow::SameDay`] it starts at midnight of that day, so records
/// of earlier days are never revisited.
pub fn window_for(
    now: DateTime<Utc>,
    delay_hours: u32,
    window: ReconcileWindow,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let target = now - Duration::hours(i64::from(delay_hours));
    let end = truncate_to_hour(target);
    let start = match window {
        ReconcileWindow::SameDay => start_of_day(target),
        ReconcileWindow::AllPending => DateTime::<Utc>::UNIX_EPOCH,
    };
    (start, end)
}

pub struct GainReconciliationWorker {
    client: SharedPlatformClient,
    gains: Arc<dyn PointGainStore>,
    config: ReconcileConfig,
}

impl GainReconciliationWorker {
    pub const NAME: &'static str = "points-gain";

    pub fn new(client: SharedPlatformClient, stores: &Stores, config: ReconcileConfig) -> Self {
        Self {
            client,
            gains: stores.point_gains.clone(),
            config,
        }
    }

    pub async fn reconcile_at(
        &self,
        ctx: &WorkerContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let (start, end) = window_for(now, self.config.delay_hours, self.config.window);
        let pending = self.gains.list_dangling(start, end)?;
        info!(
            count = pending.len(),
            window_start = %start,
            window_end = %end,
            "Reconciling pending gain records"
        );

        let mut report = CycleReport::default();
        let total = pending.len();

        for (index, record) in pending.iter().enumerate() {
            if ctx.should_stop() {
                report.abandoned = total - index;
                info!(
                    abandoned = report.abandoned,
                    "Stop requested, abandoning remaining records"
                );
                break;
            }

            let points = match self.client.fetch_user_points(ctx.session, record.user_id).await {
                Ok(points) => points,
                Err(e) => {
                    warn!(
                        event_id = record.event_id,
                        user_id = record.user_id,
                        error = %e,
                        "Failed to fetch user points"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .gains
                .complete_if_pending(record.event_id, record.user_id, points)
            {
                Ok(true) => {
                    debug!(
                        event_id = record.event_id,
                        user_id = record.user_id,
                        before = record.points_before,
                        after = points,
                        "Gain record completed"
                    );
                    report.processed += 1;
                }
                Ok(false) => {
                    debug!(
                        event_id = record.event_id,
                        user_id = record.user_id,
                        "Record was completed elsewhere"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        event_id = record.event_id,
                        user_id = record.user_id,
                        error = %e,
                        "Failed to complete gain record"
                    );
                    report.failed += 1;
                }
            }
        }

        metrics::record_gains_completed(report.processed as u64);
        Ok(report)
    }
}

#[async_trait]
impl UnitOfWork for GainReconciliationWorker {
    async fn run(&self, ctx: &WorkerContext<'_>) -> Result<CycleReport> {
        self.reconcile_at(ctx, Utc::now()).await
    }
}
