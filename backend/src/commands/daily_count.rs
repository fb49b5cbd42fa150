use crate::calendar::parse_date;
use crate::commands::branch::DeleteInput;
use crate::commands::utils::parse_branch_filter;
use crate::db::{DbDailyCount, DbPool};
use crate::error::{CounselError, CounselResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound for a single day's lead count per channel.
pub const MAX_DAILY_COUNT: i32 = 100_000;

#[derive(Debug, Deserialize)]
pub struct DailyCountInput {
    pub date: String,
    pub branch_id: Option<i32>,
    #[serde(default)]
    pub online_db_count: i32,
    #[serde(default)]
    pub offline_db_count: i32,
}

#[derive(Debug, PartialEq)]
pub struct DailyCountEntry {
    pub date: NaiveDate,
    pub branch_id: i32,
    pub online: i32,
    pub offline: i32,
}

impl DailyCountInput {
    pub fn validate(&self) -> CounselResult<DailyCountEntry> {
        let date = parse_date(&self.date)?;
        let branch_id = self
            .branch_id
            .ok_or_else(|| CounselError::validation("지점을 선택해주세요."))?;
        for count in [self.online_db_count, self.offline_db_count] {
            if !(0..=MAX_DAILY_COUNT).contains(&count) {
                return Err(CounselError::validation(format!(
                    "DB 수량은 0 이상 {} 이하로 입력해주세요.",
                    MAX_DAILY_COUNT
                )));
            }
        }
        Ok(DailyCountEntry {
            date,
            branch_id,
            online: self.online_db_count,
            offline: self.offline_db_count,
        })
    }
}

/// Inserts or overwrites the counts recorded for one branch on one day.
pub async fn upsert_daily_count_internal(
    pool: &DbPool,
    entry: &DailyCountEntry,
) -> CounselResult<DbDailyCount> {
    let row = sqlx::query_as::<_, DbDailyCount>(
        "INSERT INTO db_daily_counts (date, branch_id, online_db_count, offline_db_count)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT ON CONSTRAINT db_daily_counts_date_branch_key
         DO UPDATE SET online_db_count = EXCLUDED.online_db_count,
                       offline_db_count = EXCLUDED.offline_db_count
         RETURNING id, date, branch_id, online_db_count, offline_db_count",
    )
    .bind(entry.date)
    .bind(entry.branch_id)
    .bind(entry.online)
    .bind(entry.offline)
    .fetch_one(pool)
    .await?;
    tracing::info!(
        "DB count saved for branch {} on {}: {}/{}",
        row.branch_id,
        row.date,
        row.online_db_count,
        row.offline_db_count
    );
    Ok(row)
}

pub async fn save_daily_count(
    State(state): State<AppState>,
    Json(input): Json<DailyCountInput>,
) -> CounselResult<Json<DbDailyCount>> {
    let entry = input.validate()?;
    Ok(Json(upsert_daily_count_internal(&state.pool, &entry).await?))
}

#[derive(Deserialize)]
pub struct DailyCountQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub branch_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DailyCountRow {
    #[serde(flatten)]
    pub count: DbDailyCount,
    pub total: i64,
}

impl From<DbDailyCount> for DailyCountRow {
    fn from(count: DbDailyCount) -> Self {
        DailyCountRow {
            total: i64::from(count.online_db_count) + i64::from(count.offline_db_count),
            count,
        }
    }
}

fn optional_date(raw: Option<&str>) -> CounselResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(v) => parse_date(v).map(Some),
        None => Ok(None),
    }
}

pub async fn list_daily_counts_internal(
    pool: &DbPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    branch_id: Option<i32>,
) -> CounselResult<Vec<DailyCountRow>> {
    let rows = sqlx::query_as::<_, DbDailyCount>(
        "SELECT d.id, d.date, d.branch_id, d.online_db_count, d.offline_db_count,
                b.name AS branch_name
         FROM db_daily_counts d JOIN branches b ON b.id = d.branch_id
         WHERE ($1::date IS NULL OR d.date >= $1)
           AND ($2::date IS NULL OR d.date <= $2)
           AND ($3::int IS NULL OR d.branch_id = $3)
         ORDER BY d.date DESC, b.name ASC",
    )
    .bind(start)
    .bind(end)
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(DailyCountRow::from).collect())
}

pub async fn get_daily_counts(
    State(state): State<AppState>,
    Query(params): Query<DailyCountQuery>,
) -> CounselResult<Json<Vec<DailyCountRow>>> {
    let start = optional_date(params.start_date.as_deref())?;
    let end = optional_date(params.end_date.as_deref())?;
    let branch_id = parse_branch_filter(params.branch_id.as_deref())?;
    Ok(Json(
        list_daily_counts_internal(&state.pool, start, end, branch_id).await?,
    ))
}

pub async fn delete_daily_count(
    State(state): State<AppState>,
    Json(input): Json<DeleteInput>,
) -> CounselResult<Json<()>> {
    let result = sqlx::query("DELETE FROM db_daily_counts WHERE id = $1")
        .bind(input.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CounselError::not_found("DB 수량 기록"));
    }
    Ok(Json(()))
}
