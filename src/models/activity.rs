use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, SqlitePool};
use tracing::error;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::models::response::ResponseRecord;
use crate::state_machine::ActivityState;

/// One durable forwarding job.
///
/// Every field is assigned by the submit handler; nothing is generated by
/// the store. `state` is kept as its wire string in the row and parsed on
/// demand, `headers` is a serialized JSON object (string values only), and
/// `created_at` is whole seconds since the epoch and immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: String,
    pub url: String,
    pub method: String,
    pub reply_url: String,
    pub reply_method: String,
    pub state: String,
    pub node_id: String,
    pub created_at: i64,
    pub headers: Vec<u8>,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Projection returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActivityStatus {
    pub id: String,
    pub state: String,
}

const ACTIVITY_COLUMNS: &str =
    "id, url, method, reply_url, reply_method, state, node_id, created_at, headers, payload, content_type";

/// Refuse a state write the transition table does not allow.
///
/// An illegal transition is a bug somewhere upstream; it is logged with a
/// reference id and the row is left untouched.
pub(crate) fn ensure_transition(id: &str, current: &str, next: ActivityState) -> Result<()> {
    let current: ActivityState = current.parse().map_err(RelayError::InvalidState)?;

    if !current.can_transition_to(next) {
        error!(
            activity_id = %id,
            from = %current,
            to = %next,
            reference = %Uuid::new_v4(),
            "illegal state transition refused"
        );
        return Err(RelayError::InvalidState(format!(
            "illegal transition {current} -> {next} for activity {id}"
        )));
    }

    Ok(())
}

impl Activity {
    /// Parse the persisted state string.
    pub fn activity_state(&self) -> Result<ActivityState> {
        self.state.parse().map_err(RelayError::InvalidState)
    }

    /// Insert a new activity. Fails with `Conflict` if the id collides.
    pub async fn insert(pool: &SqlitePool, activity: &Activity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, url, method, reply_url, reply_method, state, node_id, created_at, headers, payload, content_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.url)
        .bind(&activity.method)
        .bind(&activity.reply_url)
        .bind(&activity.reply_method)
        .bind(&activity.state)
        .bind(&activity.node_id)
        .bind(activity.created_at)
        .bind(&activity.headers)
        .bind(&activity.payload)
        .bind(&activity.content_type)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Find an activity by id.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Activity>> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(activity)
    }

    /// Look up the `{id, state}` projection for the status endpoint.
    pub async fn get_status(pool: &SqlitePool, id: &str) -> Result<Option<ActivityStatus>> {
        let status =
            sqlx::query_as::<_, ActivityStatus>("SELECT id, state FROM activities WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(status)
    }

    /// Idempotent write of `state`, guarded by the transition table.
    pub async fn update_state(pool: &SqlitePool, id: &str, state: ActivityState) -> Result<()> {
        let current = Self::get_status(pool, id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("activity {id}")))?;
        ensure_transition(id, &current.state, state)?;

        let result = sqlx::query("UPDATE activities SET state = ? WHERE id = ?")
            .bind(state.to_string())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RelayError::NotFound(format!("activity {id}")));
        }
        Ok(())
    }

    /// Idempotent write of `state` and the advisory `node_id`, guarded by
    /// the transition table.
    pub async fn update_state_and_node(
        pool: &SqlitePool,
        id: &str,
        state: ActivityState,
        node_id: &str,
    ) -> Result<()> {
        let current = Self::get_status(pool, id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("activity {id}")))?;
        ensure_transition(id, &current.state, state)?;

        let result = sqlx::query("UPDATE activities SET state = ?, node_id = ? WHERE id = ?")
            .bind(state.to_string())
            .bind(node_id)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RelayError::NotFound(format!("activity {id}")));
        }
        Ok(())
    }

    /// Lease the earliest pending activity for this node.
    ///
    /// Picks the oldest row in CREATED or SCHEDULED, marks it SCHEDULED with
    /// this node's id, and returns it. The pick and the mark are one
    /// statement, so two workers on the same store never split a row's
    /// select from its update.
    pub async fn lease_next(pool: &SqlitePool, node_id: &str) -> Result<Option<Activity>> {
        let leased = sqlx::query_as::<_, Activity>(&format!(
            r#"
            UPDATE activities SET state = ?, node_id = ?
            WHERE id = (
                SELECT id FROM activities
                WHERE state IN (?, ?)
                ORDER BY created_at ASC
                LIMIT 1
            )
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(ActivityState::Scheduled.to_string())
        .bind(node_id)
        .bind(ActivityState::Created.to_string())
        .bind(ActivityState::Scheduled.to_string())
        .fetch_optional(pool)
        .await?;

        Ok(leased)
    }

    /// Activities in any of `states`, oldest first.
    pub async fn find_earliest_in_states(
        pool: &SqlitePool,
        states: &[ActivityState],
        limit: i64,
    ) -> Result<Vec<Activity>> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE state IN ("
        ));
        let mut separated = builder.separated(", ");
        for state in states {
            separated.push_bind(state.to_string());
        }
        builder.push(") ORDER BY created_at ASC LIMIT ");
        builder.push_bind(limit);

        let activities = builder
            .build_query_as::<Activity>()
            .fetch_all(pool)
            .await?;

        Ok(activities)
    }

    /// COMPLETED activities past the retention window, with their response.
    ///
    /// A LEFT JOIN, so an activity whose response was already deleted by an
    /// interrupted cleanup pass is still returned (with `None`) and can be
    /// removed on this pass.
    pub async fn find_expired_completed(
        pool: &SqlitePool,
        now: i64,
        retention_secs: i64,
    ) -> Result<Vec<(Activity, Option<ResponseRecord>)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.url, a.method, a.reply_url, a.reply_method, a.state, a.node_id,
                   a.created_at, a.headers, a.payload, a.content_type,
                   r.id AS response_row_id, r.status_code AS response_status_code,
                   r.headers AS response_headers, r.payload AS response_payload,
                   r.content_type AS response_content_type
            FROM activities a
            LEFT JOIN responses r ON r.response_id = a.id
            WHERE a.state = ? AND ? - a.created_at > ?
            ORDER BY a.created_at ASC
            "#,
        )
        .bind(ActivityState::Completed.to_string())
        .bind(now)
        .bind(retention_secs)
        .fetch_all(pool)
        .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let activity = Activity {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                method: row.try_get("method")?,
                reply_url: row.try_get("reply_url")?,
                reply_method: row.try_get("reply_method")?,
                state: row.try_get("state")?,
                node_id: row.try_get("node_id")?,
                created_at: row.try_get("created_at")?,
                headers: row.try_get("headers")?,
                payload: row.try_get("payload")?,
                content_type: row.try_get("content_type")?,
            };

            let response = match row.try_get::<Option<String>, _>("response_row_id")? {
                Some(response_row_id) => Some(ResponseRecord {
                    id: response_row_id,
                    response_id: activity.id.clone(),
                    status_code: row.try_get("response_status_code")?,
                    headers: row.try_get("response_headers")?,
                    payload: row.try_get("response_payload")?,
                    content_type: row.try_get("response_content_type")?,
                }),
                None => None,
            };

            pairs.push((activity, response));
        }

        Ok(pairs)
    }

    /// Delete an activity row.
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM activities WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an expired activity and its response in one transaction,
    /// response first to respect the foreign key.
    pub async fn purge_with_response(
        pool: &SqlitePool,
        activity_id: &str,
        response_id: Option<&str>,
    ) -> Result<()> {
        let mut tx = pool.begin().await?;

        if let Some(response_id) = response_id {
            sqlx::query("DELETE FROM responses WHERE id = ?")
                .bind(response_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM activities WHERE id = ?")
            .bind(activity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_pool_in_memory;
    use crate::models::response::NewResponse;

    fn activity(id: &str, state: ActivityState, created_at: i64) -> Activity {
        Activity {
            id: id.to_string(),
            url: "http://target.test/u".to_string(),
            method: "POST".to_string(),
            reply_url: "http://reply.test/cb".to_string(),
            reply_method: "POST".to_string(),
            state: state.to_string(),
            node_id: "node-a".to_string(),
            created_at,
            headers: b"{}".to_vec(),
            payload: b"body".to_vec(),
            content_type: "application/json".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = open_pool_in_memory().await.unwrap();
        let original = activity("a1", ActivityState::Created, 100);

        Activity::insert(&pool, &original).await.unwrap();

        let found = Activity::find_by_id(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(found, original);
        assert_eq!(found.activity_state().unwrap(), ActivityState::Created);
    }

    #[tokio::test]
    async fn insert_duplicate_id_is_conflict() {
        let pool = open_pool_in_memory().await.unwrap();
        let first = activity("a1", ActivityState::Created, 100);

        Activity::insert(&pool, &first).await.unwrap();
        let err = Activity::insert(&pool, &first).await.unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_status_projects_id_and_state() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("a1", ActivityState::SentFailed, 100))
            .await
            .unwrap();

        let status = Activity::get_status(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(status.id, "a1");
        assert_eq!(status.state, "SENT_FAILED");

        assert!(Activity::get_status(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_state_unknown_id_is_not_found() {
        let pool = open_pool_in_memory().await.unwrap();
        let err = Activity::update_state(&pool, "missing", ActivityState::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_state_refuses_illegal_transition() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("a1", ActivityState::Completed, 100))
            .await
            .unwrap();

        let err = Activity::update_state(&pool, "a1", ActivityState::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidState(_)));

        let stored = Activity::find_by_id(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(stored.state, "COMPLETED");
    }

    #[tokio::test]
    async fn update_state_and_node_refuses_illegal_transition() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("a1", ActivityState::SentFailed, 100))
            .await
            .unwrap();

        let err =
            Activity::update_state_and_node(&pool, "a1", ActivityState::Completed, "node-b")
                .await
                .unwrap_err();
        assert!(matches!(err, RelayError::InvalidState(_)));

        let stored = Activity::find_by_id(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(stored.state, "SENT_FAILED");
        assert_eq!(stored.node_id, "node-a");
    }

    #[tokio::test]
    async fn lease_next_takes_earliest_pending_and_marks_it() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("newer", ActivityState::Created, 200))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("older", ActivityState::Scheduled, 100))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("failed", ActivityState::SentFailed, 50))
            .await
            .unwrap();

        let leased = Activity::lease_next(&pool, "node-b").await.unwrap().unwrap();
        assert_eq!(leased.id, "older");
        assert_eq!(leased.state, "SCHEDULED");
        assert_eq!(leased.node_id, "node-b");

        let leased = Activity::lease_next(&pool, "node-b").await.unwrap().unwrap();
        assert_eq!(leased.id, "newer");

        // SENT_FAILED rows are not eligible until requeued.
        assert!(Activity::lease_next(&pool, "node-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_earliest_in_states_orders_and_limits() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("c", ActivityState::SentFailed, 300))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("a", ActivityState::SentFailed, 100))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("b", ActivityState::SentFailed, 200))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("other", ActivityState::Completed, 1))
            .await
            .unwrap();

        let found =
            Activity::find_earliest_in_states(&pool, &[ActivityState::SentFailed], 2)
                .await
                .unwrap();
        let ids: Vec<&str> = found.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn expired_completed_respects_strict_retention_boundary() {
        let pool = open_pool_in_memory().await.unwrap();
        let now = 1_000_000;
        let retention = 100;

        Activity::insert(&pool, &activity("expired", ActivityState::Completed, now - 101))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("boundary", ActivityState::Completed, now - 100))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("fresh", ActivityState::Completed, now - 99))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("inflight", ActivityState::Scheduled, now - 500))
            .await
            .unwrap();

        let pairs = Activity::find_expired_completed(&pool, now, retention)
            .await
            .unwrap();
        let ids: Vec<&str> = pairs.iter().map(|(a, _)| a.id.as_str()).collect();
        assert_eq!(ids, vec!["expired"]);
    }

    #[tokio::test]
    async fn expired_completed_includes_orphans_and_joined_responses() {
        let pool = open_pool_in_memory().await.unwrap();
        let now = 1_000_000;

        Activity::insert(&pool, &activity("with-resp", ActivityState::Completed, now - 200))
            .await
            .unwrap();
        Activity::insert(&pool, &activity("orphan", ActivityState::Completed, now - 300))
            .await
            .unwrap();
        ResponseRecord::insert(
            &pool,
            &NewResponse {
                id: "r1".to_string(),
                response_id: "with-resp".to_string(),
                status_code: 200,
                headers: b"{}".to_vec(),
                payload: b"ok".to_vec(),
                content_type: "text/plain".to_string(),
            },
        )
        .await
        .unwrap();

        let pairs = Activity::find_expired_completed(&pool, now, 100).await.unwrap();
        assert_eq!(pairs.len(), 2);

        let (orphan, orphan_response) = &pairs[0];
        assert_eq!(orphan.id, "orphan");
        assert!(orphan_response.is_none());

        let (joined, joined_response) = &pairs[1];
        assert_eq!(joined.id, "with-resp");
        assert_eq!(joined_response.as_ref().unwrap().id, "r1");
    }

    #[tokio::test]
    async fn purge_removes_response_and_activity() {
        let pool = open_pool_in_memory().await.unwrap();
        Activity::insert(&pool, &activity("a1", ActivityState::Completed, 100))
            .await
            .unwrap();
        ResponseRecord::insert(
            &pool,
            &NewResponse {
                id: "r1".to_string(),
                response_id: "a1".to_string(),
                status_code: 200,
                headers: b"{}".to_vec(),
                payload: vec![],
                content_type: String::new(),
            },
        )
        .await
        .unwrap();

        Activity::purge_with_response(&pool, "a1", Some("r1")).await.unwrap();

        assert!(Activity::find_by_id(&pool, "a1").await.unwrap().is_none());
        assert!(ResponseRecord::find_for_activity(&pool, "a1")
            .await
            .unwrap()
            .is_none());
    }
}
