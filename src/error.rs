use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::assets::AssetError;
use crate::auth::jwt::SessionError;
use crate::auth::services::AuthError;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a handler can surface, mapped onto a status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Login-family lookup failure, reported as 400 like the other auth-step errors.
    #[error("account not found")]
    AccountNotFound,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid otp")]
    InvalidOtp,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::AccountNotFound => (StatusCode::BAD_REQUEST, "not_found", "User not found"),
            AppError::AlreadyExists(m) => (StatusCode::BAD_REQUEST, "already_exists", m.as_str()),
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "invalid_credentials",
                "Invalid credentials",
            ),
            AppError::InvalidOtp => (StatusCode::BAD_REQUEST, "invalid_otp", "Invalid OTP"),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Dependency(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "dependency_failure",
                m.as_str(),
            ),
            AppError::Internal(detail) => {
                error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{e:#}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::Validation(format!("malformed multipart body: {}", e.body_text()))
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(m) => AppError::Validation(m),
            AuthError::NotFound => AppError::AccountNotFound,
            AuthError::AlreadyExists => AppError::AlreadyExists("User already exists!".into()),
            AuthError::RegistrationClosed => {
                AppError::Forbidden("Registration is disabled".into())
            }
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::InvalidOtp => AppError::InvalidOtp,
            AuthError::Delivery(_) => AppError::Dependency(
                "OTP was issued but could not be delivered; please retry".into(),
            ),
            AuthError::Session(e) => AppError::from(e),
            AuthError::Internal(e) => AppError::from(e),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Signing(detail) => AppError::Internal(detail),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<AssetError> for AppError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::Rejected(m) => AppError::Validation(m),
            AssetError::InvalidReference(r) => AppError::Internal(format!("invalid asset reference {r}")),
            AssetError::Storage(e) => {
                error!(error = %format!("{e:#}"), "asset store failure");
                AppError::Dependency("asset store unavailable".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let resp = AppError::Internal("argon2 $argon2id$v=19$...".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Internal server error");
        assert!(!json.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn auth_step_errors_are_bad_requests() {
        for err in [
            AppError::AccountNotFound,
            AppError::InvalidCredentials,
            AppError::InvalidOtp,
            AppError::AlreadyExists("x".into()),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn delivery_failure_maps_to_dependency_error() {
        let err: AppError = AuthError::Delivery(crate::notify::NotifyError::Transport(
            "connection refused".into(),
        ))
        .into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "dependency_failure");
    }
}
