//! Cleanup worker: retires completed activities past the retention window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::models::Activity;
use crate::workers::{Worker, WorkerContext};

/// Deletes COMPLETED activities older than the retention period, response
/// row first. Only COMPLETED rows are eligible; in-flight work is never
/// collected, however old it is.
pub struct CleanupWorker {
    ctx: WorkerContext,
}

impl CleanupWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for CleanupWorker {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.ctx.config.cleanup_tick_ms)
    }

    async fn tick(&self) -> Result<()> {
        let now = Utc::now().timestamp();
        let expired = Activity::find_expired_completed(
            &self.ctx.pool,
            now,
            self.ctx.config.retention_period_secs,
        )
        .await?;

        for (activity, response) in expired {
            Activity::purge_with_response(
                &self.ctx.pool,
                &activity.id,
                response.as_ref().map(|r| r.id.as_str()),
            )
            .await?;

            debug!(
                activity_id = %activity.id,
                age_secs = now - activity.created_at,
                "removed expired activity"
            );
        }

        Ok(())
    }
}
