use crate::db::{DbPool, Profile, ProfileRecord};
use crate::error::{CounselError, CounselResult};
use crate::middleware::auth::{issue_token, Claims};
use crate::models::{ProfileStatus, Role};
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignUpRequest {
    pub fn validate(self) -> CounselResult<NewAccount> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(CounselError::validation("이름을 입력해주세요."));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(CounselError::validation("올바른 이메일 주소를 입력해주세요."));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CounselError::validation(format!(
                "비밀번호는 {}자 이상이어야 합니다.",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(NewAccount {
            name,
            email,
            password: self.password,
        })
    }
}

/// New accounts always start as active counselors.
pub async fn signup_internal(pool: &DbPool, account: NewAccount) -> CounselResult<Profile> {
    let hashed = hash(&account.password, DEFAULT_COST)?;
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (id, name, email, password_hash, role, status)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, name, email, role, status, team_id",
    )
    .bind(Uuid::new_v4())
    .bind(&account.name)
    .bind(&account.email)
    .bind(hashed)
    .bind(Role::Counselor.as_str())
    .bind(ProfileStatus::Active.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        let duplicate = e
            .as_database_error()
            .map_or(false, |db| db.is_unique_violation());
        if duplicate {
            CounselError::Conflict("이미 가입된 이메일입니다.".to_string())
        } else {
            CounselError::Database(e)
        }
    })?;

    tracing::info!("New counselor account registered: {}", profile.email);
    Ok(profile)
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> CounselResult<Json<Profile>> {
    let account = payload.validate()?;
    Ok(Json(signup_internal(&state.pool, account).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: Option<String>,
    pub profile: Option<Profile>,
}

impl LoginResponse {
    fn failure(message: &str) -> Self {
        LoginResponse {
            success: false,
            message: message.to_string(),
            token: None,
            profile: None,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> CounselResult<Json<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.trim().is_empty() {
        return Ok(Json(LoginResponse::failure(
            "이메일과 비밀번호를 입력해주세요.",
        )));
    }

    let record = sqlx::query_as::<_, ProfileRecord>(
        "SELECT id, name, email, password_hash, role, status, team_id FROM profiles WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    let Some(record) = record else {
        return Ok(Json(LoginResponse::failure(
            "이메일 또는 비밀번호가 올바르지 않습니다.",
        )));
    };

    let is_valid = verify(&payload.password, &record.password_hash).unwrap_or_else(|e| {
        tracing::error!("Bcrypt verify error for {}: {:?}", record.email, e);
        false
    });
    if !is_valid {
        return Ok(Json(LoginResponse::failure(
            "이메일 또는 비밀번호가 올바르지 않습니다.",
        )));
    }

    if record.status.parse::<ProfileStatus>()? == ProfileStatus::Inactive {
        tracing::info!("Login refused for inactive account {}", record.email);
        return Ok(Json(LoginResponse::failure(
            "퇴사 처리된 계정입니다. 관리자에게 문의하세요.",
        )));
    }

    let role = record.role.parse::<Role>()?;
    let token = issue_token(&state.config, record.id, &record.name, role)?;
    let profile = fetch_profile(&state.pool, record.id).await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "로그인 성공".to_string(),
        token: Some(token),
        profile: Some(profile),
    }))
}

pub async fn logout(Extension(claims): Extension<Claims>) -> Json<Value> {
    tracing::debug!("User {} logged out", claims.user_id);
    Json(json!({ "success": true }))
}

pub async fn fetch_profile(pool: &DbPool, id: Uuid) -> CounselResult<Profile> {
    sqlx::query_as::<_, Profile>(
        "SELECT p.id, p.name, p.email, p.role, p.status, p.team_id, t.name AS team_name
         FROM profiles p LEFT JOIN teams t ON t.id = p.team_id
         WHERE p.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CounselError::not_found("사용자"))
}

#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub role_label: &'static str,
    pub can_access_admin: bool,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> CounselResult<Json<MeResponse>> {
    let profile = fetch_profile(&state.pool, claims.user_id).await?;
    if profile.status.parse::<ProfileStatus>()? == ProfileStatus::Inactive {
        return Err(CounselError::Auth(
            "퇴사 처리된 계정입니다. 관리자에게 문의하세요.".to_string(),
        ));
    }
    let role = profile.role.parse::<Role>()?;
    Ok(Json(MeResponse {
        profile,
        role_label: role.label(),
        can_access_admin: role.can_access_admin(),
    }))
}

pub async fn ping() -> &'static str {
    "pong"
}
