use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{CounselError, CounselResult};
use crate::models::OutcomeColumns;

pub type DbPool = Pool<Postgres>;

pub fn init_pool_with_options(opts: PgConnectOptions) -> DbPool {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts)
}

pub fn init_pool(database_url: &str) -> CounselResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| CounselError::Internal(format!("Invalid DB URL: {}", e)))?;
    Ok(init_pool_with_options(opts))
}

pub async fn init_database(pool: &DbPool, config: &AppConfig) -> CounselResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_seeds(pool, config).await?;
    tracing::info!("Database ready");
    Ok(())
}

/// Guarantees at least one administrator account exists.
async fn ensure_seeds(pool: &DbPool, config: &AppConfig) -> CounselResult<()> {
    let admin_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE role = 'Admin'")
            .fetch_one(pool)
            .await?;
    if admin_count.0 > 0 {
        return Ok(());
    }

    let hash = bcrypt::hash(&config.admin_password, bcrypt::DEFAULT_COST)?;
    sqlx::query(
        "INSERT INTO profiles (id, name, email, password_hash, role, status)
         VALUES ($1, $2, $3, $4, 'Admin', 'Active')
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind("관리자")
    .bind(config.admin_email.trim().to_lowercase())
    .bind(hash)
    .execute(pool)
    .await?;
    tracing::warn!(
        "Seeded administrator account '{}'; change its password",
        config.admin_email
    );
    Ok(())
}

#[derive(Debug, Clone, FromRow)]
pub struct ProfileRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub team_id: Option<i32>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub team_id: Option<i32>,
    #[sqlx(default)]
    pub team_name: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Branch {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Subject {
    pub id: i32,
    pub name: String,
    pub branch_id: i32,
    #[sqlx(default)]
    pub branch_name: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Team {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Client {
    pub id: i32,
    pub name: String,
    pub contact: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: i32,
    pub datetime: DateTime<Utc>,
    pub status: String,
    pub branch_id: i32,
    pub applied_subject_id: i32,
    pub counselor_id: Option<Uuid>,
    pub client_id: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub consult_type: String,
    pub comment: Option<String>,
    pub cancellation_reason: Option<String>,
    pub registration_type: Option<String>,
    pub registration_months: Option<i32>,
    pub registration_amount: Option<i64>,
    pub payment_method: Option<String>,
    pub cancellation_type: Option<String>,
    pub deduction_amount: Option<i64>,
    pub refund_amount: Option<i64>,
}

impl Appointment {
    pub fn outcome_columns(&self) -> OutcomeColumns {
        OutcomeColumns {
            cancellation_reason: self.cancellation_reason.clone(),
            registration_type: self.registration_type.clone(),
            registration_months: self.registration_months,
            registration_amount: self.registration_amount,
            payment_method: self.payment_method.clone(),
            cancellation_type: self.cancellation_type.clone(),
            deduction_amount: self.deduction_amount,
            refund_amount: self.refund_amount,
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct DbDailyCount {
    pub id: i32,
    pub date: NaiveDate,
    pub branch_id: i32,
    pub online_db_count: i32,
    pub offline_db_count: i32,
    #[sqlx(default)]
    pub branch_name: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ActivityLog {
    pub id: i32,
    pub user_id: Option<Uuid>,
    pub appointment_id: Option<i32>,
    pub action: String,
    pub appointment_date: Option<DateTime<Utc>>,
    pub counselor_name: Option<String>,
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub actor_name: Option<String>,
}
