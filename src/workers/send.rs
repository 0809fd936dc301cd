//! Send worker: drives pending activities through the target call.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Activity, NewResponse, ResponseRecord};
use crate::state_machine::ActivityState;
use crate::workers::reply::deliver_reply;
use crate::workers::{Worker, WorkerContext};

/// Leases the earliest CREATED or SCHEDULED activity, calls its target, and
/// persists the outcome. On success the reply is delivered inline, so a SENT
/// activity only rests on disk if the process dies between the two calls.
pub struct SendWorker {
    ctx: WorkerContext,
}

impl SendWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    async fn process(&self, activity: Activity) -> Result<()> {
        let pool = &self.ctx.pool;

        // A persisted response means an earlier pass already got the target's
        // answer and was interrupted before finishing; never call the target
        // a second time for it.
        if let Some(existing) = ResponseRecord::find_for_activity(pool, &activity.id).await? {
            Activity::update_state(pool, &activity.id, ActivityState::Sent).await?;
            deliver_reply(&self.ctx, &activity, &existing).await?;
            return Ok(());
        }

        let dispatched = match self.ctx.dispatcher.call_target(&activity).await {
            Ok(dispatched) => dispatched,
            Err(error) => {
                warn!(
                    activity_id = %activity.id,
                    url = %activity.url,
                    %error,
                    "target call failed"
                );
                Activity::update_state(pool, &activity.id, ActivityState::SentFailed).await?;
                return Ok(());
            }
        };

        if !self.ctx.config.is_allowed_status(dispatched.status) {
            warn!(
                activity_id = %activity.id,
                url = %activity.url,
                status = dispatched.status,
                body = %String::from_utf8_lossy(&dispatched.payload),
                "target returned disallowed status"
            );
            Activity::update_state(pool, &activity.id, ActivityState::SentFailed).await?;
            return Ok(());
        }

        let response = ResponseRecord::insert_and_mark_sent(
            pool,
            &NewResponse {
                id: Uuid::now_v7().to_string(),
                response_id: activity.id.clone(),
                status_code: i64::from(dispatched.status),
                headers: dispatched.headers,
                payload: dispatched.payload,
                content_type: dispatched.content_type,
            },
        )
        .await?;

        info!(
            activity_id = %activity.id,
            status = response.status_code,
            "target call succeeded"
        );

        deliver_reply(&self.ctx, &activity, &response).await?;
        Ok(())
    }
}

#[async_trait]
impl Worker for SendWorker {
    fn name(&self) -> &'static str {
        "send"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.ctx.config.send_tick_ms)
    }

    async fn tick(&self) -> Result<()> {
        let Some(activity) = Activity::lease_next(&self.ctx.pool, &self.ctx.config.node_id).await?
        else {
            return Ok(());
        };

        self.process(activity).await
    }
}
