use crate::error::{CounselError, CounselResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const HOLIDAY_COLOR: &str = "#ffcdd2";

/// Public holiday shown as a background day on the calendar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub title: String,
    pub color: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NagerHoliday {
    date: NaiveDate,
    local_name: String,
}

pub fn parse_holidays(body: &str) -> CounselResult<Vec<Holiday>> {
    let raw: Vec<NagerHoliday> = serde_json::from_str(body)?;
    Ok(dedupe_by_date(raw.into_iter().map(|h| Holiday {
        date: h.date,
        title: h.local_name,
        color: HOLIDAY_COLOR,
    })))
}

/// Keeps the first holiday seen for each date, ordered by date.
fn dedupe_by_date(items: impl IntoIterator<Item = Holiday>) -> Vec<Holiday> {
    let mut out: Vec<Holiday> = Vec::new();
    for h in items {
        if !out.iter().any(|seen| seen.date == h.date) {
            out.push(h);
        }
    }
    out.sort_by_key(|h| h.date);
    out
}

async fn fetch_year(state: &AppState, year: i32) -> CounselResult<Vec<Holiday>> {
    let url = format!(
        "{}/api/v3/PublicHolidays/{}/{}",
        state.config.holiday_api_base.trim_end_matches('/'),
        year,
        state.config.holiday_country
    );
    let body = state
        .http
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_holidays(&body)
}

fn cached(state: &AppState, year: i32) -> Option<Vec<Holiday>> {
    state
        .holidays
        .lock()
        .ok()
        .and_then(|cache| cache.get(&year).cloned())
}

/// Holidays for `year`, fetched once per process. A failed fetch is logged
/// and yields an empty list so the calendar still renders.
pub async fn holidays_for_year(state: &AppState, year: i32) -> Vec<Holiday> {
    if let Some(hit) = cached(state, year) {
        return hit;
    }

    match fetch_year(state, year).await {
        Ok(list) => {
            if let Ok(mut cache) = state.holidays.lock() {
                cache.insert(year, list.clone());
            }
            tracing::info!("Loaded {} holidays for {}", list.len(), year);
            list
        }
        Err(e) => {
            tracing::warn!("Failed to load holidays for {}: {}", year, e);
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
pub struct HolidayQuery {
    pub year: Option<i32>,
}

pub async fn get_holidays(
    State(state): State<AppState>,
    Query(params): Query<HolidayQuery>,
) -> CounselResult<Json<Vec<Holiday>>> {
    let year = match params.year {
        Some(y) if (1900..=2200).contains(&y) => y,
        Some(y) => return Err(CounselError::validation(format!("잘못된 연도입니다: {}", y))),
        None => Utc::now().with_timezone(&state.config.timezone).year(),
    };
    Ok(Json(holidays_for_year(&state, year).await))
}
