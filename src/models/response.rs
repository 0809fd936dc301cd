use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{RelayError, Result};
use crate::models::activity::ensure_transition;
use crate::state_machine::ActivityState;

/// The persisted result of a successful target call.
///
/// Written once when the target first succeeds and never updated; every
/// reply attempt replays this row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ResponseRecord {
    pub id: String,
    /// Id of the activity this response belongs to.
    pub response_id: String,
    pub status_code: i64,
    pub headers: Vec<u8>,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Response fields for creation.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub id: String,
    pub response_id: String,
    pub status_code: i64,
    pub headers: Vec<u8>,
    pub payload: Vec<u8>,
    pub content_type: String,
}

impl ResponseRecord {
    /// Insert a response row.
    pub async fn insert(pool: &SqlitePool, new: &NewResponse) -> Result<ResponseRecord> {
        sqlx::query(
            r#"
            INSERT INTO responses (id, response_id, status_code, headers, payload, content_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.id)
        .bind(&new.response_id)
        .bind(new.status_code)
        .bind(&new.headers)
        .bind(&new.payload)
        .bind(&new.content_type)
        .execute(pool)
        .await?;

        Ok(ResponseRecord {
            id: new.id.clone(),
            response_id: new.response_id.clone(),
            status_code: new.status_code,
            headers: new.headers.clone(),
            payload: new.payload.clone(),
            content_type: new.content_type.clone(),
        })
    }

    /// Insert a response and mark its activity SENT in one transaction.
    ///
    /// The pairing is what guarantees a crash never leaves a SENT activity
    /// without its response or a committed response on a row that will be
    /// sent again.
    pub async fn insert_and_mark_sent(
        pool: &SqlitePool,
        new: &NewResponse,
    ) -> Result<ResponseRecord> {
        let mut tx = pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT state FROM activities WHERE id = ?")
                .bind(&new.response_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current
            .ok_or_else(|| RelayError::NotFound(format!("activity {}", new.response_id)))?;
        ensure_transition(&new.response_id, &current, ActivityState::Sent)?;

        sqlx::query(
            r#"
            INSERT INTO responses (id, response_id, status_code, headers, payload, content_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.id)
        .bind(&new.response_id)
        .bind(new.status_code)
        .bind(&new.headers)
        .bind(&new.payload)
        .bind(&new.content_type)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE activities SET state = ? WHERE id = ?")
            .bind(ActivityState::Sent.to_string())
            .bind(&new.response_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ResponseRecord {
            id: new.id.clone(),
            response_id: new.response_id.clone(),
            status_code: new.status_code,
            headers: new.headers.clone(),
            payload: new.payload.clone(),
            content_type: new.content_type.clone(),
        })
    }

    /// The response for an activity, if one has been persisted.
    pub async fn find_for_activity(
        pool: &SqlitePool,
        activity_id: &str,
    ) -> Result<Option<ResponseRecord>> {
        let response = sqlx::query_as::<_, ResponseRecord>(
            "SELECT id, response_id, status_code, headers, payload, content_type FROM responses WHERE response_id = ?",
        )
        .bind(activity_id)
        .fetch_optional(pool)
        .await?;

        Ok(response)
    }

    /// All responses for an activity. The state machine keeps this at most
    /// one; the list form exists for invariant checks.
    pub async fn list_for_activity(
        pool: &SqlitePool,
        activity_id: &str,
    ) -> Result<Vec<ResponseRecord>> {
        let responses = sqlx::query_as::<_, ResponseRecord>(
            "SELECT id, response_id, status_code, headers, payload, content_type FROM responses WHERE response_id = ?",
        )
        .bind(activity_id)
        .fetch_all(pool)
        .await?;

        Ok(responses)
    }

    /// Delete a response row.
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM responses WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
