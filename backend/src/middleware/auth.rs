use crate::config::AppConfig;
use crate::error::{CounselError, CounselResult};
use crate::models::{ProfileStatus, Role};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.can_access_admin()
    }
}

const PUBLIC_ROUTES: &[&str] = &["/api/auth/signup", "/api/auth/login", "/api/ping"];

pub fn issue_token(
    config: &AppConfig,
    user_id: Uuid,
    name: &str,
    role: Role,
) -> CounselResult<String> {
    let exp = chrono::Utc::now() + chrono::Duration::hours(config.jwt_ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        user_id,
        name: name.to_string(),
        role,
        exp: exp.timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&config.jwt_secret),
    )?)
}

pub fn verify_token(config: &AppConfig, token: &str) -> CounselResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&config.jwt_secret),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the role to trust for a request from the stored profile row.
/// Missing and deactivated accounts are treated as signed out.
fn account_role(row: Option<(String, String)>) -> CounselResult<Role> {
    let Some((role, status)) = row else {
        return Err(CounselError::Auth("계정 정보를 찾을 수 없습니다.".to_string()));
    };
    if status.parse::<ProfileStatus>()? == ProfileStatus::Inactive {
        return Err(CounselError::Auth(
            "퇴사 처리된 계정입니다. 관리자에게 문의하세요.".to_string(),
        ));
    }
    role.parse()
}

async fn authenticate(state: &AppState, token: Option<String>) -> CounselResult<Claims> {
    let token = token.ok_or_else(|| CounselError::Auth("로그인이 필요합니다.".to_string()))?;
    let mut claims = verify_token(&state.config, &token)?;

    let row: Option<(String, String)> =
        sqlx::query_as("SELECT role, status FROM profiles WHERE id = $1")
            .bind(claims.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let role = account_role(row).map_err(|e| {
        tracing::info!("Rejected token for {}: {}", claims.user_id, e);
        e
    })?;
    if role != claims.role {
        tracing::debug!(
            "Role of {} changed since login: {:?} -> {:?}",
            claims.user_id,
            claims.role,
            role
        );
    }
    claims.role = role;
    Ok(claims)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !path.starts_with("/api/") || PUBLIC_ROUTES.contains(&path) {
        return next.run(request).await;
    }

    let token = bearer_token(&request).map(str::to_owned);
    match authenticate(&state, token).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Admin pages are limited to Admin and Director.
pub async fn require_admin(request: Request, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<Claims>()
        .map_or(false, Claims::is_admin);

    if !allowed {
        return CounselError::Forbidden("관리자 권한이 필요합니다.".to_string()).into_response();
    }
    next.run(request).await
}
