use crate::commands::auth::fetch_profile;
use crate::db::{DbPool, Profile};
use crate::error::{CounselError, CounselResult};
use crate::middleware::auth::Claims;
use crate::models::{ProfileStatus, Role};
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

pub async fn list_profiles_internal(pool: &DbPool) -> CounselResult<Vec<Profile>> {
    Ok(sqlx::query_as::<_, Profile>(
        "SELECT p.id, p.name, p.email, p.role, p.status, p.team_id, t.name AS team_name
         FROM profiles p LEFT JOIN teams t ON t.id = p.team_id
         ORDER BY p.name ASC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn get_all_users(State(state): State<AppState>) -> CounselResult<Json<Vec<Profile>>> {
    Ok(Json(list_profiles_internal(&state.pool).await?))
}

/// A single-field edit from the user management table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ProfileChange {
    Role(Role),
    TeamId(Option<i32>),
    Status(ProfileStatus),
}

impl ProfileChange {
    /// Administrators may not demote or deactivate their own account.
    pub fn check_actor(&self, actor: Uuid, target: Uuid) -> CounselResult<()> {
        if actor != target {
            return Ok(());
        }
        match self {
            ProfileChange::Role(_) => Err(CounselError::Forbidden(
                "자신의 역할은 변경할 수 없습니다.".to_string(),
            )),
            ProfileChange::Status(ProfileStatus::Inactive) => Err(CounselError::Forbidden(
                "자신의 계정을 퇴사 처리할 수 없습니다.".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub id: Uuid,
    pub change: ProfileChange,
}

pub async fn update_profile_internal(
    pool: &DbPool,
    id: Uuid,
    change: &ProfileChange,
) -> CounselResult<Profile> {
    let query = match change {
        ProfileChange::Role(role) => sqlx::query("UPDATE profiles SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(id),
        ProfileChange::TeamId(team_id) => {
            sqlx::query("UPDATE profiles SET team_id = $1 WHERE id = $2")
                .bind(*team_id)
                .bind(id)
        }
        ProfileChange::Status(status) => {
            sqlx::query("UPDATE profiles SET status = $1 WHERE id = $2")
                .bind(status.as_str())
                .bind(id)
        }
    };

    let result = query.execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(CounselError::not_found("사용자"));
    }
    tracing::info!("Profile {} updated: {:?}", id, change);
    fetch_profile(pool, id).await
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> CounselResult<Json<Profile>> {
    payload.change.check_actor(claims.user_id, payload.id)?;
    Ok(Json(
        update_profile_internal(&state.pool, payload.id, &payload.change).await?,
    ))
}
