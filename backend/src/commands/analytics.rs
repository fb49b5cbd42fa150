use crate::calendar::{day_range, local_date, parse_date};
use crate::commands::utils::parse_branch_filter;
use crate::db::{DbPool, Subject, Team};
use crate::error::CounselResult;
use crate::models::{AppointmentStatus, CancellationType, PaymentMethod};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Appointment fields the report looks at.
#[derive(Debug, Clone, Default, FromRow)]
pub struct AppointmentFact {
    pub counselor_id: Option<Uuid>,
    pub status: String,
    pub applied_subject_id: i32,
    pub registered_subject_ids: Vec<i32>,
    pub cancellation_type: Option<String>,
    pub payment_method: Option<String>,
    pub registration_amount: Option<i64>,
}

impl AppointmentFact {
    fn status(&self) -> Option<AppointmentStatus> {
        self.status.parse().ok()
    }

    fn is_completed(&self) -> bool {
        self.status().map_or(false, |s| s.is_consulted())
    }

    fn is_registered(&self) -> bool {
        self.status() == Some(AppointmentStatus::Registered)
    }

    fn has_cancellation(&self, kind: CancellationType) -> bool {
        self.cancellation_type.as_deref() == Some(kind.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub team_id: Option<i32>,
}

#[derive(Debug, Default)]
pub struct AnalyticsInput {
    pub total_db: i64,
    pub appointments: Vec<AppointmentFact>,
    pub teams: Vec<Team>,
    pub members: Vec<TeamMember>,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MemberStats {
    pub id: Uuid,
    pub name: String,
    pub completed: usize,
    pub registered: usize,
    pub national_cancellations: usize,
    pub general_refunds: usize,
    pub registration_rate: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TeamStats {
    pub id: i32,
    pub name: String,
    pub members: Vec<MemberStats>,
    pub completed: usize,
    pub registered: usize,
    pub national_cancellations: usize,
    pub general_refunds: usize,
    pub registration_rate: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SubjectStats {
    pub id: i32,
    pub name: String,
    pub applied: usize,
    pub registered: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PaymentStats {
    pub name: &'static str,
    pub count: usize,
    pub amount: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AnalyticsReport {
    pub total_db: i64,
    pub total_appointments: usize,
    pub completed_appointments: usize,
    pub registered_appointments: usize,
    pub db_to_consultation_rate: f64,
    pub registration_rate: f64,
    pub team_stats: Vec<TeamStats>,
    pub subject_stats: Vec<SubjectStats>,
    pub payment_stats: Vec<PaymentStats>,
}

/// Percentage rounded to one decimal place; zero when there is nothing to
/// divide by.
pub fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
}

fn member_stats(member: &TeamMember, appointments: &[AppointmentFact]) -> MemberStats {
    let own: Vec<&AppointmentFact> = appointments
        .iter()
        .filter(|a| a.counselor_id == Some(member.id))
        .collect();
    let completed = own.iter().filter(|a| a.is_completed()).count();
    let registered = own.iter().filter(|a| a.is_registered()).count();
    MemberStats {
        id: member.id,
        name: member.name.clone(),
        completed,
        registered,
        national_cancellations: own
            .iter()
            .filter(|a| a.has_cancellation(CancellationType::NationalCancel))
            .count(),
        general_refunds: own
            .iter()
            .filter(|a| a.has_cancellation(CancellationType::GeneralRefund))
            .count(),
        registration_rate: rate(registered, completed),
    }
}

fn team_stats(team: &Team, input: &AnalyticsInput) -> TeamStats {
    let members: Vec<MemberStats> = input
        .members
        .iter()
        .filter(|m| m.team_id == Some(team.id))
        .map(|m| member_stats(m, &input.appointments))
        .collect();
    let completed = members.iter().map(|m| m.completed).sum();
    let registered = members.iter().map(|m| m.registered).sum();
    TeamStats {
        id: team.id,
        name: team.name.clone(),
        completed,
        registered,
        national_cancellations: members.iter().map(|m| m.national_cancellations).sum(),
        general_refunds: members.iter().map(|m| m.general_refunds).sum(),
        registration_rate: rate(registered, completed),
        members,
    }
}

pub fn build_report(input: &AnalyticsInput) -> AnalyticsReport {
    let appointments = &input.appointments;
    let total = appointments.len();
    let completed = appointments.iter().filter(|a| a.is_completed()).count();
    let registered = appointments.iter().filter(|a| a.is_registered()).count();

    let mut teams: Vec<&Team> = input.teams.iter().collect();
    teams.sort_by(|a, b| a.name.cmp(&b.name));
    let team_stats = teams.into_iter().map(|t| team_stats(t, input)).collect();

    let applied_ids: BTreeSet<i32> = appointments.iter().map(|a| a.applied_subject_id).collect();
    let subject_stats = input
        .subjects
        .iter()
        .filter(|s| applied_ids.contains(&s.id))
        .map(|s| SubjectStats {
            id: s.id,
            name: s.name.clone(),
            applied: appointments
                .iter()
                .filter(|a| a.applied_subject_id == s.id)
                .count(),
            registered: appointments
                .iter()
                .filter(|a| a.is_registered() && a.registered_subject_ids.contains(&s.id))
                .count(),
        })
        .collect();

    let payment_stats = PaymentMethod::ALL
        .iter()
        .map(|method| {
            let paid: Vec<&AppointmentFact> = appointments
                .iter()
                .filter(|a| a.payment_method.as_deref() == Some(method.as_str()))
                .collect();
            PaymentStats {
                name: method.as_str(),
                count: paid.len(),
                amount: paid.iter().filter_map(|a| a.registration_amount).sum(),
            }
        })
        .collect();

    AnalyticsReport {
        total_db: input.total_db,
        total_appointments: total,
        completed_appointments: completed,
        registered_appointments: registered,
        db_to_consultation_rate: rate(total, input.total_db.max(0) as usize),
        registration_rate: rate(registered, completed),
        team_stats,
        subject_stats,
        payment_stats,
    }
}

pub async fn load_input(
    pool: &DbPool,
    tz: Tz,
    start: NaiveDate,
    end: NaiveDate,
    branch_id: Option<i32>,
) -> CounselResult<AnalyticsInput> {
    let (from, to) = day_range(start, end, tz)?;

    let total_db: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(online_db_count::BIGINT + offline_db_count::BIGINT), 0)::BIGINT
         FROM db_daily_counts
         WHERE date >= $1 AND date <= $2 AND ($3::int IS NULL OR branch_id = $3)",
    )
    .bind(start)
    .bind(end)
    .bind(branch_id)
    .fetch_one(pool)
    .await?;

    let appointments = sqlx::query_as::<_, AppointmentFact>(
        "SELECT a.counselor_id, a.status, a.applied_subject_id,
                COALESCE(ARRAY_AGG(rs.subject_id) FILTER (WHERE rs.subject_id IS NOT NULL), '{}')
                    AS registered_subject_ids,
                a.cancellation_type, a.payment_method, a.registration_amount
         FROM appointments a
         LEFT JOIN registration_subjects rs ON rs.appointment_id = a.id
         WHERE a.datetime >= $1 AND a.datetime < $2
           AND ($3::int IS NULL OR a.branch_id = $3)
         GROUP BY a.id",
    )
    .bind(from)
    .bind(to)
    .bind(branch_id)
    .fetch_all(pool)
    .await?;

    let teams = sqlx::query_as::<_, Team>("SELECT id, name FROM teams ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    let members = sqlx::query_as::<_, TeamMember>(
        "SELECT id, name, team_id FROM profiles WHERE team_id IS NOT NULL ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, name, branch_id FROM subjects ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(AnalyticsInput {
        total_db,
        appointments,
        teams,
        members,
        subjects,
    })
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub branch_id: Option<String>,
}

/// Defaults to the current month up to today.
fn resolve_period(params: &AnalyticsQuery, today: NaiveDate) -> CounselResult<(NaiveDate, NaiveDate)> {
    let start = match params.start_date.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(v) => parse_date(v)?,
        None => today.with_day(1).unwrap_or(today),
    };
    let end = match params.end_date.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(v) => parse_date(v)?,
        None => today,
    };
    Ok((start, end))
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsQuery>,
) -> CounselResult<Json<AnalyticsReport>> {
    let tz = state.config.timezone;
    let (start, end) = resolve_period(&params, local_date(Utc::now(), tz))?;
    let branch_id = parse_branch_filter(params.branch_id.as_deref())?;

    let input = load_input(&state.pool, tz, start, end, branch_id).await?;
    let report = build_report(&input);
    tracing::debug!(
        "Analytics {}..{} branch {:?}: {} appointments",
        start,
        end,
        branch_id,
        report.total_appointments
    );
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(counselor: Uuid, status: &str, subject: i32) -> AppointmentFact {
        AppointmentFact {
            counselor_id: Some(counselor),
            status: status.to_string(),
            applied_subject_id: subject,
            ..Default::default()
        }
    }

    #[test]
    fn rates_round_to_one_decimal() {
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(5, 0), 0.0);
        assert_eq!(rate(0, 4), 0.0);
    }

    #[test]
    fn empty_period_reports_zeroes() {
        let report = build_report(&AnalyticsInput::default());
        assert_eq!(report.total_appointments, 0);
        assert_eq!(report.db_to_consultation_rate, 0.0);
        assert_eq!(report.registration_rate, 0.0);
        assert_eq!(report.payment_stats.len(), 4);
        assert!(report.subject_stats.is_empty());
    }

    #[test]
    fn aggregates_teams_subjects_and_payments() {
        let kim = Uuid::new_v4();
        let lee = Uuid::new_v4();
        let park = Uuid::new_v4();

        let mut registered = fact(kim, "등록", 1);
        registered.registered_subject_ids = vec![1, 2];
        registered.payment_method = Some("단말기".to_string());
        registered.registration_amount = Some(300_000);

        let mut refunded = fact(lee, "취소/환불", 2);
        refunded.cancellation_type = Some("일반 환불".to_string());

        let input = AnalyticsInput {
            total_db: 8,
            appointments: vec![
                registered,
                fact(kim, "상담 완료", 1),
                fact(kim, "상담 예정", 1),
                refunded,
                fact(park, "상담 취소", 1),
            ],
            teams: vec![
                Team { id: 2, name: "B팀".to_string() },
                Team { id: 1, name: "A팀".to_string() },
            ],
            members: vec![
                TeamMember { id: kim, name: "김상담".to_string(), team_id: Some(1) },
                TeamMember { id: lee, name: "이상담".to_string(), team_id: Some(2) },
                TeamMember { id: park, name: "박상담".to_string(), team_id: None },
            ],
            subjects: vec![
                Subject { id: 1, name: "심리".to_string(), branch_id: 1, branch_name: None },
                Subject { id: 2, name: "진로".to_string(), branch_id: 1, branch_name: None },
                Subject { id: 3, name: "학습".to_string(), branch_id: 1, branch_name: None },
            ],
        };

        let report = build_report(&input);
        assert_eq!(report.total_appointments, 5);
        assert_eq!(report.completed_appointments, 2);
        assert_eq!(report.registered_appointments, 1);
        assert_eq!(report.db_to_consultation_rate, 62.5);
        assert_eq!(report.registration_rate, 50.0);

        let names: Vec<&str> = report.team_stats.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["A팀", "B팀"]);
        let a_team = &report.team_stats[0];
        assert_eq!(a_team.members.len(), 1);
        assert_eq!(a_team.completed, 2);
        assert_eq!(a_team.registered, 1);
        assert_eq!(a_team.registration_rate, 50.0);
        assert_eq!(report.team_stats[1].general_refunds, 1);

        assert_eq!(report.subject_stats.len(), 2);
        assert_eq!(report.subject_stats[0].applied, 4);
        assert_eq!(report.subject_stats[0].registered, 1);
        assert_eq!(report.subject_stats[1].applied, 1);
        assert_eq!(report.subject_stats[1].registered, 1);

        let terminal = &report.payment_stats[2];
        assert_eq!(terminal.name, "단말기");
        assert_eq!(terminal.count, 1);
        assert_eq!(terminal.amount, 300_000);
    }

    #[test]
    fn period_defaults_to_month_to_date() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let params = AnalyticsQuery {
            start_date: None,
            end_date: None,
            branch_id: None,
        };
        let (start, end) = resolve_period(&params, today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
        assert_eq!(end, today);
    }
}
