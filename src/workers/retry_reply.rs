//! Retry-reply worker: re-delivers responses whose reply call failed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::error;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Activity, ResponseRecord};
use crate::state_machine::ActivityState;
use crate::workers::reply::deliver_reply;
use crate::workers::{Worker, WorkerContext};

/// Picks the earliest REPLY_FAILED activity and replays its persisted
/// response to the reply URL. The target is never called again from here;
/// the response captured at the first successful send is authoritative.
pub struct RetryReplyWorker {
    ctx: WorkerContext,
}

impl RetryReplyWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for RetryReplyWorker {
    fn name(&self) -> &'static str {
        "retry-reply"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.ctx.config.retry_reply_tick_ms)
    }

    async fn tick(&self) -> Result<()> {
        let Some(activity) = Activity::find_earliest_in_states(
            &self.ctx.pool,
            &[ActivityState::ReplyFailed],
            1,
        )
        .await?
        .into_iter()
        .next()
        else {
            return Ok(());
        };

        let Some(response) =
            ResponseRecord::find_for_activity(&self.ctx.pool, &activity.id).await?
        else {
            // REPLY_FAILED implies a persisted response; a missing one is an
            // invariant violation, not something this worker can repair.
            error!(
                activity_id = %activity.id,
                reference = %Uuid::new_v4(),
                "reply-failed activity has no persisted response"
            );
            return Ok(());
        };

        deliver_reply(&self.ctx, &activity, &response).await?;
        Ok(())
    }
}
