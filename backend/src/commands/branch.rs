use crate::commands::utils::clean_name;
use crate::db::{Branch, DbPool};
use crate::error::{CounselError, CounselResult};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;

pub async fn list_branches_internal(pool: &DbPool) -> CounselResult<Vec<Branch>> {
    Ok(
        sqlx::query_as::<_, Branch>("SELECT id, name FROM branches ORDER BY name ASC")
            .fetch_all(pool)
            .await?,
    )
}

pub async fn get_branches(State(state): State<AppState>) -> CounselResult<Json<Vec<Branch>>> {
    Ok(Json(list_branches_internal(&state.pool).await?))
}

#[derive(Deserialize)]
pub struct CreateBranchInput {
    pub name: String,
}

pub async fn create_branch_internal(pool: &DbPool, name: &str) -> CounselResult<Branch> {
    let name = clean_name(name, "지점명")?;
    let branch = sqlx::query_as::<_, Branch>(
        "INSERT INTO branches (name) VALUES ($1) RETURNING id, name",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    tracing::info!("Branch created: {} ({})", branch.name, branch.id);
    Ok(branch)
}

pub async fn create_branch(
    State(state): State<AppState>,
    Json(input): Json<CreateBranchInput>,
) -> CounselResult<Json<Branch>> {
    Ok(Json(create_branch_internal(&state.pool, &input.name).await?))
}

#[derive(Deserialize)]
pub struct UpdateBranchInput {
    pub id: i32,
    pub name: String,
}

pub async fn update_branch(
    State(state): State<AppState>,
    Json(input): Json<UpdateBranchInput>,
) -> CounselResult<Json<Branch>> {
    let name = clean_name(&input.name, "지점명")?;
    let current = sqlx::query_as::<_, Branch>("SELECT id, name FROM branches WHERE id = $1")
        .bind(input.id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| CounselError::not_found("지점"))?;

    if current.name == name {
        return Ok(Json(current));
    }

    let branch = sqlx::query_as::<_, Branch>(
        "UPDATE branches SET name = $1 WHERE id = $2 RETURNING id, name",
    )
    .bind(name)
    .bind(input.id)
    .fetch_one(&state.pool)
    .await?;
    Ok(Json(branch))
}

#[derive(Deserialize)]
pub struct DeleteInput {
    pub id: i32,
}

pub async fn delete_branch(
    State(state): State<AppState>,
    Json(input): Json<DeleteInput>,
) -> CounselResult<Json<()>> {
    let result = sqlx::query("DELETE FROM branches WHERE id = $1")
        .bind(input.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CounselError::not_found("지점"));
    }
    tracing::info!("Branch {} deleted", input.id);
    Ok(Json(()))
}
