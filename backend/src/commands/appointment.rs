use crate::calendar::{
    day_range, local_date, local_time_label, local_to_utc, parse_date, parse_range_bound,
    parse_time_slot, summarize_day, time_slots, DaySummary,
};
use crate::commands::activity_log::{record_activity, ActivityEntry};
use crate::commands::client::{find_or_create_client, update_client};
use crate::db::{Appointment, DbPool, Subject};
use crate::error::{CounselError, CounselResult};
use crate::middleware::auth::Claims;
use crate::models::{
    ActivityAction, AppointmentOutcome, AppointmentStatus, CancellationReason, CancellationType,
    ConsultType, OutcomeFields, PaymentMethod, RegistrationType, MAX_REGISTERED_SUBJECTS,
};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::BTreeSet;
use uuid::Uuid;

const UNASSIGNED_COUNSELOR: &str = "미지정";
const MISSING_INFO: &str = "정보없음";

// ---------------------------------------------------------------------------
// Calendar events
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: i32,
    pub datetime: DateTime<Utc>,
    pub status: String,
    pub client_name: Option<String>,
    pub counselor_name: Option<String>,
    pub subject_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: i32,
    pub title: String,
    pub start: DateTime<Utc>,
    pub status: String,
    pub background_color: &'static str,
    pub border_color: &'static str,
}

pub fn event_title(client: Option<&str>, counselor: Option<&str>, subject: Option<&str>) -> String {
    format!(
        "{} ({}, {})",
        client.unwrap_or(MISSING_INFO),
        counselor.unwrap_or(UNASSIGNED_COUNSELOR),
        subject.unwrap_or(MISSING_INFO)
    )
}

/// Unknown statuses fall back to the scheduled color.
pub fn status_color(status: &str) -> &'static str {
    status
        .parse::<AppointmentStatus>()
        .unwrap_or(AppointmentStatus::Scheduled)
        .color()
}

impl From<EventRow> for CalendarEvent {
    fn from(row: EventRow) -> Self {
        let color = status_color(&row.status);
        CalendarEvent {
            id: row.id,
            title: event_title(
                row.client_name.as_deref(),
                row.counselor_name.as_deref(),
                row.subject_name.as_deref(),
            ),
            start: row.datetime,
            status: row.status,
            background_color: color,
            border_color: color,
        }
    }
}

pub async fn list_events_internal(
    pool: &DbPool,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> CounselResult<Vec<CalendarEvent>> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT a.id, a.datetime, a.status,
                c.name AS client_name, p.name AS counselor_name, s.name AS subject_name
         FROM appointments a
         LEFT JOIN clients c ON c.id = a.client_id
         LEFT JOIN profiles p ON p.id = a.counselor_id
         LEFT JOIN subjects s ON s.id = a.applied_subject_id
         WHERE ($1::timestamptz IS NULL OR a.datetime >= $1)
           AND ($2::timestamptz IS NULL OR a.datetime < $2)
         ORDER BY a.datetime ASC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CalendarEvent::from).collect())
}

#[derive(Deserialize)]
pub struct EventQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

fn optional_bound(raw: Option<&str>, tz: Tz, inclusive_end: bool) -> CounselResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(v) => parse_range_bound(v, tz, inclusive_end).map(Some),
        None => Ok(None),
    }
}

pub async fn get_events(
    State(state): State<AppState>,
    Query(params): Query<EventQuery>,
) -> CounselResult<Json<Vec<CalendarEvent>>> {
    let tz = state.config.timezone;
    let from = optional_bound(params.start.as_deref(), tz, false)?;
    let to = optional_bound(params.end.as_deref(), tz, true)?;
    Ok(Json(list_events_internal(&state.pool, from, to).await?))
}

// ---------------------------------------------------------------------------
// Detail
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct AppointmentNames {
    client_name: Option<String>,
    client_contact: Option<String>,
    branch_name: Option<String>,
    subject_name: Option<String>,
    counselor_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub date: NaiveDate,
    pub time: String,
    pub color: &'static str,
    pub client_name: Option<String>,
    pub client_contact: Option<String>,
    pub branch_name: Option<String>,
    pub subject_name: Option<String>,
    pub counselor_name: Option<String>,
    pub registered_subjects: Vec<Subject>,
    pub outcome: Option<AppointmentOutcome>,
}

const APPOINTMENT_COLUMNS: &str = "id, datetime, status, branch_id, applied_subject_id, counselor_id, client_id, type, comment,
     cancellation_reason, registration_type, registration_months, registration_amount, payment_method,
     cancellation_type, deduction_amount, refund_amount";

async fn fetch_appointment<'e, E>(executor: E, id: i32, lock: bool) -> CounselResult<Appointment>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM appointments WHERE id = $1{}",
        APPOINTMENT_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Appointment>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| CounselError::not_found("상담 내역"))
}

pub async fn get_detail_internal(pool: &DbPool, tz: Tz, id: i32) -> CounselResult<AppointmentDetail> {
    let appointment = fetch_appointment(pool, id, false).await?;

    let names = sqlx::query_as::<_, AppointmentNames>(
        "SELECT c.name AS client_name, c.contact AS client_contact, b.name AS branch_name,
                s.name AS subject_name, p.name AS counselor_name
         FROM appointments a
         LEFT JOIN clients c ON c.id = a.client_id
         LEFT JOIN branches b ON b.id = a.branch_id
         LEFT JOIN subjects s ON s.id = a.applied_subject_id
         LEFT JOIN profiles p ON p.id = a.counselor_id
         WHERE a.id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    let registered_subjects = sqlx::query_as::<_, Subject>(
        "SELECT s.id, s.name, s.branch_id
         FROM registration_subjects rs JOIN subjects s ON s.id = rs.subject_id
         WHERE rs.appointment_id = $1
         ORDER BY s.id ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let outcome = appointment.status.parse::<AppointmentStatus>().ok().and_then(|status| {
        AppointmentOutcome::from_columns(
            status,
            &appointment.outcome_columns(),
            registered_subjects.iter().map(|s| s.id).collect(),
        )
    });

    Ok(AppointmentDetail {
        date: local_date(appointment.datetime, tz),
        time: local_time_label(appointment.datetime, tz),
        color: status_color(&appointment.status),
        client_name: names.client_name,
        client_contact: names.client_contact,
        branch_name: names.branch_name,
        subject_name: names.subject_name,
        counselor_name: names.counselor_name,
        registered_subjects,
        outcome,
        appointment,
    })
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> CounselResult<Json<AppointmentDetail>> {
    Ok(Json(
        get_detail_internal(&state.pool, state.config.timezone, id).await?,
    ))
}

// ---------------------------------------------------------------------------
// Create / update / delete
// ---------------------------------------------------------------------------

/// Appointment modal contents. `date` may be omitted when editing, in which
/// case the appointment stays on its current day.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentForm {
    pub client_name: String,
    pub client_contact: String,
    pub branch_id: i32,
    pub subject_id: i32,
    #[serde(rename = "type")]
    pub consult_type: ConsultType,
    #[serde(default)]
    pub date: Option<String>,
    pub time: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub outcome: OutcomeFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAppointment {
    pub client_name: String,
    pub client_contact: String,
    pub branch_id: i32,
    pub subject_id: i32,
    pub consult_type: ConsultType,
    pub datetime: DateTime<Utc>,
    pub comment: Option<String>,
    pub outcome: AppointmentOutcome,
}

impl ValidatedAppointment {
    /// Applied subject plus registered subjects, deduplicated.
    pub fn subject_ids(&self) -> Vec<i32> {
        std::iter::once(self.subject_id)
            .chain(self.outcome.registered_subject_ids().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl AppointmentForm {
    pub fn validate(self, tz: Tz, current_date: Option<NaiveDate>) -> CounselResult<ValidatedAppointment> {
        let date = match self.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_date(raw)?,
            None => current_date.ok_or_else(|| CounselError::validation("상담 날짜를 선택해주세요."))?,
        };
        let time = parse_time_slot(&self.time)?;
        let datetime = local_to_utc(date, time, tz)?;
        let outcome = self.outcome.into_outcome()?;
        let comment = self
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(ValidatedAppointment {
            client_name: self.client_name,
            client_contact: self.client_contact,
            branch_id: self.branch_id,
            subject_id: self.subject_id,
            consult_type: self.consult_type,
            datetime,
            comment,
            outcome,
        })
    }
}

async fn ensure_subjects_in_branch(
    tx: &mut Transaction<'_, Postgres>,
    branch_id: i32,
    subject_ids: &[i32],
) -> CounselResult<()> {
    let (matched,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM subjects WHERE branch_id = $1 AND id = ANY($2)",
    )
    .bind(branch_id)
    .bind(subject_ids.to_vec())
    .fetch_one(&mut **tx)
    .await?;
    if matched as usize != subject_ids.len() {
        return Err(CounselError::validation(
            "선택한 과목이 해당 지점에 속하지 않습니다.",
        ));
    }
    Ok(())
}

async fn replace_registered_subjects(
    tx: &mut Transaction<'_, Postgres>,
    appointment_id: i32,
    subject_ids: &[i32],
) -> CounselResult<()> {
    sqlx::query("DELETE FROM registration_subjects WHERE appointment_id = $1")
        .bind(appointment_id)
        .execute(&mut **tx)
        .await?;
    if subject_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO registration_subjects (appointment_id, subject_id)
         SELECT $1, UNNEST($2::int[])",
    )
    .bind(appointment_id)
    .bind(subject_ids.to_vec())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn counselor_name(
    tx: &mut Transaction<'_, Postgres>,
    counselor_id: Option<Uuid>,
) -> CounselResult<Option<String>> {
    let Some(id) = counselor_id else {
        return Ok(None);
    };
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn create_appointment_internal(
    pool: &DbPool,
    actor: &Claims,
    form: ValidatedAppointment,
) -> CounselResult<i32> {
    let mut tx = pool.begin().await?;

    let client = find_or_create_client(&mut tx, &form.client_name, &form.client_contact).await?;
    ensure_subjects_in_branch(&mut tx, form.branch_id, &form.subject_ids()).await?;

    let cols = form.outcome.columns();
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO appointments
            (datetime, status, branch_id, applied_subject_id, counselor_id, client_id, type, comment,
             cancellation_reason, registration_type, registration_months, registration_amount,
             payment_method, cancellation_type, deduction_amount, refund_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
         RETURNING id",
    )
    .bind(form.datetime)
    .bind(form.outcome.status().as_str())
    .bind(form.branch_id)
    .bind(form.subject_id)
    .bind(actor.user_id)
    .bind(client.id)
    .bind(form.consult_type.as_str())
    .bind(&form.comment)
    .bind(cols.cancellation_reason)
    .bind(cols.registration_type)
    .bind(cols.registration_months)
    .bind(cols.registration_amount)
    .bind(cols.payment_method)
    .bind(cols.cancellation_type)
    .bind(cols.deduction_amount)
    .bind(cols.refund_amount)
    .fetch_one(&mut *tx)
    .await?;

    replace_registered_subjects(&mut tx, id, form.outcome.registered_subject_ids()).await?;

    record_activity(
        &mut tx,
        ActivityEntry {
            user_id: actor.user_id,
            appointment_id: id,
            action: ActivityAction::Created,
            appointment_date: form.datetime,
            counselor_name: Some(actor.name.as_str()),
            client_name: Some(client.name.as_str()),
        },
    )
    .await?;

    tx.commit().await?;
    Ok(id)
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(form): Json<AppointmentForm>,
) -> CounselResult<Json<AppointmentDetail>> {
    let tz = state.config.timezone;
    let form = form.validate(tz, None)?;
    let id = create_appointment_internal(&state.pool, &claims, form).await?;
    Ok(Json(get_detail_internal(&state.pool, tz, id).await?))
}

pub async fn update_appointment_internal(
    pool: &DbPool,
    tz: Tz,
    actor: &Claims,
    id: i32,
    form: AppointmentForm,
) -> CounselResult<()> {
    let mut tx = pool.begin().await?;

    let existing = fetch_appointment(&mut *tx, id, true).await?;
    let form = form.validate(tz, Some(local_date(existing.datetime, tz)))?;

    let client = update_client(&mut tx, existing.client_id, &form.client_name, &form.client_contact).await?;
    ensure_subjects_in_branch(&mut tx, form.branch_id, &form.subject_ids()).await?;

    let cols = form.outcome.columns();
    sqlx::query(
        "UPDATE appointments SET
            datetime = $1, status = $2, branch_id = $3, applied_subject_id = $4, type = $5,
            comment = $6, cancellation_reason = $7, registration_type = $8,
            registration_months = $9, registration_amount = $10, payment_method = $11,
            cancellation_type = $12, deduction_amount = $13, refund_amount = $14,
            updated_at = NOW()
         WHERE id = $15",
    )
    .bind(form.datetime)
    .bind(form.outcome.status().as_str())
    .bind(form.branch_id)
    .bind(form.subject_id)
    .bind(form.consult_type.as_str())
    .bind(&form.comment)
    .bind(cols.cancellation_reason)
    .bind(cols.registration_type)
    .bind(cols.registration_months)
    .bind(cols.registration_amount)
    .bind(cols.payment_method)
    .bind(cols.cancellation_type)
    .bind(cols.deduction_amount)
    .bind(cols.refund_amount)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    replace_registered_subjects(&mut tx, id, form.outcome.registered_subject_ids()).await?;

    let counselor = counselor_name(&mut tx, existing.counselor_id).await?;
    record_activity(
        &mut tx,
        ActivityEntry {
            user_id: actor.user_id,
            appointment_id: id,
            action: ActivityAction::Updated,
            appointment_date: form.datetime,
            counselor_name: counselor.as_deref(),
            client_name: Some(client.name.as_str()),
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(form): Json<AppointmentForm>,
) -> CounselResult<Json<AppointmentDetail>> {
    let tz = state.config.timezone;
    update_appointment_internal(&state.pool, tz, &claims, id, form).await?;
    Ok(Json(get_detail_internal(&state.pool, tz, id).await?))
}

pub async fn delete_appointment_internal(pool: &DbPool, actor: &Claims, id: i32) -> CounselResult<()> {
    let mut tx = pool.begin().await?;

    let existing = fetch_appointment(&mut *tx, id, true).await?;
    let counselor = counselor_name(&mut tx, existing.counselor_id).await?;
    let client: Option<(String,)> = sqlx::query_as("SELECT name FROM clients WHERE id = $1")
        .bind(existing.client_id)
        .fetch_optional(&mut *tx)
        .await?;

    record_activity(
        &mut tx,
        ActivityEntry {
            user_id: actor.user_id,
            appointment_id: id,
            action: ActivityAction::Deleted,
            appointment_date: existing.datetime,
            counselor_name: counselor.as_deref(),
            client_name: client.as_ref().map(|c| c.0.as_str()),
        },
    )
    .await?;

    sqlx::query("DELETE FROM appointments WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> CounselResult<Json<()>> {
    delete_appointment_internal(&state.pool, &claims, id).await?;
    Ok(Json(()))
}

// ---------------------------------------------------------------------------
// Today / form options
// ---------------------------------------------------------------------------

pub async fn today_summary_internal(pool: &DbPool, tz: Tz, now: DateTime<Utc>) -> CounselResult<DaySummary> {
    let today = local_date(now, tz);
    let (from, to) = day_range(today, today, tz)?;
    let starts: Vec<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT datetime FROM appointments WHERE datetime >= $1 AND datetime < $2",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(summarize_day(&starts, now, tz))
}

pub async fn get_today_summary(State(state): State<AppState>) -> CounselResult<Json<DaySummary>> {
    Ok(Json(
        today_summary_internal(&state.pool, state.config.timezone, Utc::now()).await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct StatusOption {
    pub value: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub time_slots: Vec<String>,
    pub statuses: Vec<StatusOption>,
    pub appointment_types: Vec<&'static str>,
    pub registration_types: Vec<&'static str>,
    pub payment_methods: Vec<&'static str>,
    pub cancellation_reasons: Vec<&'static str>,
    pub cancellation_types: Vec<&'static str>,
    pub max_registered_subjects: usize,
}

pub fn form_options() -> FormOptions {
    FormOptions {
        time_slots: time_slots(),
        statuses: AppointmentStatus::ALL
            .iter()
            .map(|s| StatusOption {
                value: s.as_str(),
                color: s.color(),
            })
            .collect(),
        appointment_types: ConsultType::ALL.iter().map(|t| t.as_str()).collect(),
        registration_types: RegistrationType::ALL.iter().map(|t| t.as_str()).collect(),
        payment_methods: PaymentMethod::ALL.iter().map(|t| t.as_str()).collect(),
        cancellation_reasons: CancellationReason::ALL.iter().map(|t| t.as_str()).collect(),
        cancellation_types: CancellationType::ALL.iter().map(|t| t.as_str()).collect(),
        max_registered_subjects: MAX_REGISTERED_SUBJECTS,
    }
}

pub async fn get_form_options() -> Json<FormOptions> {
    Json(form_options())
}
