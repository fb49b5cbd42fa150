use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounselError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Serialize for CounselError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type CounselResult<T> = Result<T, CounselError>;

impl CounselError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CounselError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CounselError::NotFound(what.into())
    }
}

fn database_status(e: &sqlx::Error) -> (StatusCode, String) {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return (
                StatusCode::CONFLICT,
                "이미 존재하는 데이터입니다.".to_string(),
            );
        }
        if db_err.is_foreign_key_violation() {
            return (
                StatusCode::CONFLICT,
                "연결된 데이터가 있어 처리할 수 없습니다.".to_string(),
            );
        }
    }
    if matches!(e, sqlx::Error::RowNotFound) {
        return (
            StatusCode::NOT_FOUND,
            "요청한 데이터를 찾을 수 없습니다.".to_string(),
        );
    }
    tracing::error!("Database Error: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "데이터베이스 오류가 발생했습니다.".to_string(),
    )
}

impl IntoResponse for CounselError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            CounselError::Database(ref e) => database_status(e),
            CounselError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            CounselError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            CounselError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            CounselError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            CounselError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{}을(를) 찾을 수 없습니다.", what))
            }
            CounselError::Internal(msg) => {
                tracing::error!("Internal Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "서버 내부 오류가 발생했습니다.".to_string(),
                )
            }
            CounselError::Token(e) => {
                tracing::debug!("Token rejected: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "인증 정보가 올바르지 않습니다.".to_string(),
                )
            }
            CounselError::Network(e) => {
                tracing::warn!("Upstream request failed: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "외부 네트워크 연결에 실패했습니다.".to_string(),
                )
            }
            _ => {
                tracing::error!("Unhandled Error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "알 수 없는 오류가 발생했습니다.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
