//! Status handler: `{id, state}` lookup for a submitted activity.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::models::{Activity, ActivityStatus};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

pub async fn message_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<ActivityStatus>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing query parameter 'id'".to_string()))?;

    let status = Activity::get_status(&state.pool, &id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(status))
}
