use crate::commands::branch::DeleteInput;
use crate::commands::utils::clean_name;
use crate::db::{DbPool, Team};
use crate::error::{CounselError, CounselResult};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;

pub async fn list_teams_internal(pool: &DbPool) -> CounselResult<Vec<Team>> {
    Ok(
        sqlx::query_as::<_, Team>("SELECT id, name FROM teams ORDER BY name ASC")
            .fetch_all(pool)
            .await?,
    )
}

pub async fn get_teams(State(state): State<AppState>) -> CounselResult<Json<Vec<Team>>> {
    Ok(Json(list_teams_internal(&state.pool).await?))
}

#[derive(Deserialize)]
pub struct CreateTeamInput {
    pub name: String,
}

pub async fn create_team(
    State(state): State<AppState>,
    Json(input): Json<CreateTeamInput>,
) -> CounselResult<Json<Team>> {
    let name = clean_name(&input.name, "팀명")?;
    let team = sqlx::query_as::<_, Team>("INSERT INTO teams (name) VALUES ($1) RETURNING id, name")
        .bind(name)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(team))
}

#[derive(Deserialize)]
pub struct UpdateTeamInput {
    pub id: i32,
    pub name: String,
}

pub async fn update_team(
    State(state): State<AppState>,
    Json(input): Json<UpdateTeamInput>,
) -> CounselResult<Json<Team>> {
    let name = clean_name(&input.name, "팀명")?;
    let current = sqlx::query_as::<_, Team>("SELECT id, name FROM teams WHERE id = $1")
        .bind(input.id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| CounselError::not_found("팀"))?;

    if current.name == name {
        return Ok(Json(current));
    }

    let team = sqlx::query_as::<_, Team>("UPDATE teams SET name = $1 WHERE id = $2 RETURNING id, name")
        .bind(name)
        .bind(input.id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(team))
}

// Members of a deleted team become unassigned (ON DELETE SET NULL).
pub async fn delete_team(
    State(state): State<AppState>,
    Json(input): Json<DeleteInput>,
) -> CounselResult<Json<()>> {
    let result = sqlx::query("DELETE FROM teams WHERE id = $1")
        .bind(input.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CounselError::not_found("팀"));
    }
    Ok(Json(()))
}
