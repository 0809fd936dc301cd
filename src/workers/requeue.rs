//! Requeue worker: returns failed sends to the schedule.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::models::Activity;
use crate::state_machine::ActivityState;
use crate::workers::{Worker, WorkerContext};

const BATCH_SIZE: i64 = 100;

/// Moves every SENT_FAILED activity back to SCHEDULED, oldest first, making
/// it eligible for the send worker again. This is the sole path by which a
/// failed target call re-enters the send pipeline; keeping it off the send
/// worker's hot loop means the failure tail is scanned at a slower cadence.
pub struct RequeueWorker {
    ctx: WorkerContext,
}

impl RequeueWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for RequeueWorker {
    fn name(&self) -> &'static str {
        "requeue"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.ctx.config.requeue_tick_ms)
    }

    async fn tick(&self) -> Result<()> {
        loop {
            let batch = Activity::find_earliest_in_states(
                &self.ctx.pool,
                &[ActivityState::SentFailed],
                BATCH_SIZE,
            )
            .await?;

            if batch.is_empty() {
                return Ok(());
            }

            for activity in &batch {
                Activity::update_state_and_node(
                    &self.ctx.pool,
                    &activity.id,
                    ActivityState::Scheduled,
                    &self.ctx.config.node_id,
                )
                .await?;
            }

            debug!(count = batch.len(), "requeued failed sends");

            if (batch.len() as i64) < BATCH_SIZE {
                return Ok(());
            }
        }
    }
}
