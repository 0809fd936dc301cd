//! Reply delivery, shared by the send and retry-reply workers.

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{Activity, ResponseRecord};
use crate::state_machine::ActivityState;
use crate::workers::WorkerContext;

/// Forward a persisted response to the activity's reply URL and persist the
/// outcome.
///
/// Every delivery goes through here, so the correlation header carrying the
/// activity id is attached on first attempts and retries alike. Returns the
/// state that was written.
pub async fn deliver_reply(
    ctx: &WorkerContext,
    activity: &Activity,
    response: &ResponseRecord,
) -> Result<ActivityState> {
    let outcome = match ctx.dispatcher.call_reply(activity, response).await {
        Ok(dispatched) if ctx.config.is_allowed_status(dispatched.status) => {
            ActivityState::Completed
        }
        Ok(dispatched) => {
            warn!(
                activity_id = %activity.id,
                reply_url = %activity.reply_url,
                status = dispatched.status,
                body = %String::from_utf8_lossy(&dispatched.payload),
                "reply delivery returned disallowed status"
            );
            ActivityState::ReplyFailed
        }
        Err(error) => {
            warn!(
                activity_id = %activity.id,
                reply_url = %activity.reply_url,
                %error,
                "reply delivery failed"
            );
            ActivityState::ReplyFailed
        }
    };

    Activity::update_state(&ctx.pool, &activity.id, outcome).await?;

    if outcome == ActivityState::Completed {
        info!(activity_id = %activity.id, "activity completed");
    }

    Ok(outcome)
}
