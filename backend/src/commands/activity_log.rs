use crate::db::{ActivityLog, DbPool};
use crate::error::CounselResult;
use crate::models::ActivityAction;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

pub const RECENT_LOG_LIMIT: i64 = 100;

/// Snapshot of the appointment the action was taken on. Names are copied so
/// the log survives deletion of the appointment.
pub struct ActivityEntry<'a> {
    pub user_id: Uuid,
    pub appointment_id: i32,
    pub action: ActivityAction,
    pub appointment_date: DateTime<Utc>,
    pub counselor_name: Option<&'a str>,
    pub client_name: Option<&'a str>,
}

pub async fn record_activity(
    tx: &mut Transaction<'_, Postgres>,
    entry: ActivityEntry<'_>,
) -> CounselResult<()> {
    sqlx::query(
        "INSERT INTO activity_logs
            (user_id, appointment_id, action, appointment_date, counselor_name, client_name)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.user_id)
    .bind(entry.appointment_id)
    .bind(entry.action.as_str())
    .bind(entry.appointment_date)
    .bind(entry.counselor_name)
    .bind(entry.client_name)
    .execute(&mut **tx)
    .await?;
    tracing::info!(
        "Activity '{}' on appointment {} by {}",
        entry.action,
        entry.appointment_id,
        entry.user_id
    );
    Ok(())
}

pub async fn recent_logs_internal(pool: &DbPool) -> CounselResult<Vec<ActivityLog>> {
    Ok(sqlx::query_as::<_, ActivityLog>(
        "SELECT l.id, l.user_id, l.appointment_id, l.action, l.appointment_date,
                l.counselor_name, l.client_name, l.created_at, p.name AS actor_name
         FROM activity_logs l LEFT JOIN profiles p ON p.id = l.user_id
         ORDER BY l.created_at DESC, l.id DESC
         LIMIT $1",
    )
    .bind(RECENT_LOG_LIMIT)
    .fetch_all(pool)
    .await?)
}

pub async fn get_recent_logs(
    State(state): State<AppState>,
) -> CounselResult<Json<Vec<ActivityLog>>> {
    Ok(Json(recent_logs_internal(&state.pool).await?))
}
