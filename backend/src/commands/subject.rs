use crate::commands::branch::DeleteInput;
use crate::commands::utils::{clean_name, parse_branch_filter};
use crate::db::{DbPool, Subject};
use crate::error::{CounselError, CounselResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

pub async fn list_subjects_internal(
    pool: &DbPool,
    branch_id: Option<i32>,
) -> CounselResult<Vec<Subject>> {
    let rows = sqlx::query_as::<_, Subject>(
        "SELECT s.id, s.name, s.branch_id, b.name AS branch_name
         FROM subjects s JOIN branches b ON b.id = s.branch_id
         WHERE ($1::int IS NULL OR s.branch_id = $1)
         ORDER BY s.id ASC",
    )
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectQuery {
    #[serde(alias = "branch_id")]
    pub branch_id: Option<String>,
}

pub async fn get_subjects(
    State(state): State<AppState>,
    Query(params): Query<SubjectQuery>,
) -> CounselResult<Json<Vec<Subject>>> {
    let branch_id = parse_branch_filter(params.branch_id.as_deref())?;
    Ok(Json(list_subjects_internal(&state.pool, branch_id).await?))
}

#[derive(Deserialize)]
pub struct CreateSubjectInput {
    pub name: String,
    pub branch_id: Option<i32>,
}

pub async fn create_subject_internal(
    pool: &DbPool,
    name: &str,
    branch_id: Option<i32>,
) -> CounselResult<Subject> {
    let (name, branch_id) = match (clean_name(name, "과목명"), branch_id) {
        (Ok(name), Some(branch_id)) => (name, branch_id),
        _ => {
            return Err(CounselError::validation(
                "과목 이름과 소속 지점을 모두 선택해야 합니다.",
            ))
        }
    };

    let subject = sqlx::query_as::<_, Subject>(
        "INSERT INTO subjects (name, branch_id) VALUES ($1, $2)
         RETURNING id, name, branch_id",
    )
    .bind(name)
    .bind(branch_id)
    .fetch_one(pool)
    .await?;
    Ok(subject)
}

pub async fn create_subject(
    State(state): State<AppState>,
    Json(input): Json<CreateSubjectInput>,
) -> CounselResult<Json<Subject>> {
    Ok(Json(
        create_subject_internal(&state.pool, &input.name, input.branch_id).await?,
    ))
}

#[derive(Deserialize)]
pub struct UpdateSubjectInput {
    pub id: i32,
    pub name: String,
}

pub async fn update_subject(
    State(state): State<AppState>,
    Json(input): Json<UpdateSubjectInput>,
) -> CounselResult<Json<Subject>> {
    let name = clean_name(&input.name, "과목명")?;
    let current = sqlx::query_as::<_, Subject>(
        "SELECT id, name, branch_id FROM subjects WHERE id = $1",
    )
    .bind(input.id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| CounselError::not_found("과목"))?;

    if current.name == name {
        return Ok(Json(current));
    }

    let subject = sqlx::query_as::<_, Subject>(
        "UPDATE subjects SET name = $1 WHERE id = $2 RETURNING id, name, branch_id",
    )
    .bind(name)
    .bind(input.id)
    .fetch_one(&state.pool)
    .await?;
    Ok(Json(subject))
}

pub async fn delete_subject(
    State(state): State<AppState>,
    Json(input): Json<DeleteInput>,
) -> CounselResult<Json<()>> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = $1")
        .bind(input.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CounselError::not_found("과목"));
    }
    Ok(Json(()))
}
