use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, warn};

use crate::auth::jwt::SessionError;
use crate::auth::otp;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::Created;
use crate::auth::repo_types::Admin;
use crate::notify::{Notification, NotifyError};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("no admin with that email")]
    NotFound,
    #[error("an admin with that email already exists")]
    AlreadyExists,
    #[error("registration is disabled")]
    RegistrationClosed,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired otp")]
    InvalidOtp,
    #[error("otp delivery failed: {0}")]
    Delivery(#[from] NotifyError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AuthError::Validation("Valid email is required".into()));
    }
    Ok(email)
}

/// Argon2 is CPU bound; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("hash task failed: {e}"))?
        .map_err(AuthError::Internal)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("verify task failed: {e}"))?
        .map_err(AuthError::Internal)
}

/// Create the admin identity. Never logs the new admin in.
pub async fn register(
    st: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Admin, AuthError> {
    if !st.config.registration_enabled {
        return Err(AuthError::RegistrationClosed);
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("Name is required".into()));
    }
    let email = normalize_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if st.admins.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::AlreadyExists);
    }

    let hash = hash_blocking(password.to_string()).await?;
    match st.admins.create(name, &email, &hash).await? {
        Created::Admin(admin) => {
            info!(admin_id = %admin.id, "admin registered");
            Ok(admin)
        }
        Created::EmailTaken => Err(AuthError::AlreadyExists),
    }
}

/// Login step one: check the password, then issue and mail a fresh OTP.
///
/// The OTP stays issued even if delivery fails; the caller gets
/// [`AuthError::Delivery`] and can simply log in again.
pub async fn submit_credentials(st: &AppState, email: &str, password: &str) -> Result<(), AuthError> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".into()));
    }

    let admin = st
        .admins
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::NotFound)?;

    if !verify_blocking(password.to_string(), admin.password_hash.clone()).await? {
        warn!(admin_id = %admin.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let code = otp::generate();
    let expires_at = OffsetDateTime::now_utc() + TimeDuration::seconds(st.config.otp_ttl_seconds);
    st.admins.set_pending_otp(admin.id, code, expires_at).await?;

    st.notifier
        .send(Notification::otp(&admin.email, code))
        .await
        .map_err(|e| {
            warn!(admin_id = %admin.id, error = %e, "otp delivery failed");
            AuthError::Delivery(e)
        })?;

    info!(admin_id = %admin.id, "otp issued");
    Ok(())
}

/// Login step two: trade the pending OTP for a session token. The code is
/// cleared on success, so it cannot be replayed.
pub async fn verify_otp(
    st: &AppState,
    email: &str,
    code: &serde_json::Value,
) -> Result<String, AuthError> {
    let email = normalize_email(email)?;
    let admin = st
        .admins
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::NotFound)?;

    let code = otp::normalize(code).ok_or(AuthError::InvalidOtp)?;
    let Some(admin) = st
        .admins
        .consume_otp(&admin.email, code, OffsetDateTime::now_utc())
        .await?
    else {
        warn!(admin_id = %admin.id, "otp mismatch, expired or already used");
        return Err(AuthError::InvalidOtp);
    };

    let token = st.sessions.issue(admin.id)?;
    info!(admin_id = %admin.id, "admin logged in");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending_code(notifier: &crate::notify::RecordingNotifier, email: &str) -> i32 {
        let body = notifier.last_to(email).expect("otp mail").body;
        body.rsplit(' ').next().unwrap().parse().unwrap()
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a b@x.com"));
        assert_eq!(normalize_email("  A@X.com ").unwrap(), "a@x.com");
    }

    #[tokio::test]
    async fn register_validates_and_rejects_duplicates() {
        let (st, _notifier, _storage) = AppState::fake_with_handles();
        assert!(matches!(
            register(&st, "Admin", "a@x.com", "12345").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            register(&st, " ", "a@x.com", "secret1").await,
            Err(AuthError::Validation(_))
        ));
        let admin = register(&st, "Admin", "a@x.com", "secret1").await.unwrap();
        assert_eq!(admin.email, "a@x.com");
        assert!(admin.otp_code.is_none());
        assert!(matches!(
            register(&st, "Other", "A@x.com", "secret2").await,
            Err(AuthError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn login_failures_are_distinct() {
        let (st, notifier, _storage) = AppState::fake_with_handles();
        register(&st, "Admin", "a@x.com", "secret1").await.unwrap();

        assert!(matches!(
            submit_credentials(&st, "nobody@x.com", "secret1").await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            submit_credentials(&st, "a@x.com", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn only_the_latest_code_verifies_and_only_once() {
        let (st, notifier, _storage) = AppState::fake_with_handles();
        register(&st, "Admin", "a@x.com", "secret1").await.unwrap();

        submit_credentials(&st, "a@x.com", "secret1").await.unwrap();
        let first = pending_code(&notifier, "a@x.com");
        submit_credentials(&st, "a@x.com", "secret1").await.unwrap();
        let second = pending_code(&notifier, "a@x.com");

        if first != second {
            assert!(matches!(
                verify_otp(&st, "a@x.com", &json!(first)).await,
                Err(AuthError::InvalidOtp)
            ));
        }
        let token = verify_otp(&st, "a@x.com", &json!(second.to_string()))
            .await
            .expect("latest code verifies");
        assert!(st.sessions.verify(&token).is_ok());

        // consumed
        assert!(matches!(
            verify_otp(&st, "a@x.com", &json!(second)).await,
            Err(AuthError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn verify_without_pending_code_or_with_garbage_fails() {
        let (st, _notifier, _storage) = AppState::fake_with_handles();
        register(&st, "Admin", "a@x.com", "secret1").await.unwrap();
        assert!(matches!(
            verify_otp(&st, "a@x.com", &json!(123456)).await,
            Err(AuthError::InvalidOtp)
        ));
        assert!(matches!(
            verify_otp(&st, "a@x.com", &json!("abc")).await,
            Err(AuthError::InvalidOtp)
        ));
        assert!(matches!(
            verify_otp(&st, "ghost@x.com", &json!(123456)).await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_codes_are_rejected() {
        let (mut st, notifier, _storage) = AppState::fake_with_handles();
        let mut config = (*st.config).clone();
        config.otp_ttl_seconds = -1;
        st.config = std::sync::Arc::new(config);

        register(&st, "Admin", "a@x.com", "secret1").await.unwrap();
        submit_credentials(&st, "a@x.com", "secret1").await.unwrap();
        let code = pending_code(&notifier, "a@x.com");
        assert!(matches!(
            verify_otp(&st, "a@x.com", &json!(code)).await,
            Err(AuthError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_issued_code() {
        let (st, notifier, _storage) = AppState::fake_with_handles();
        let admin = register(&st, "Admin", "a@x.com", "secret1").await.unwrap();
        notifier.set_failing(true);

        assert!(matches!(
            submit_credentials(&st, "a@x.com", "secret1").await,
            Err(AuthError::Delivery(_))
        ));
        let stored = st.admins.find_by_id(admin.id).await.unwrap().unwrap();
        assert!(stored.otp_code.is_some());
    }

    #[tokio::test]
    async fn registration_can_be_disabled() {
        let (mut st, _notifier, _storage) = AppState::fake_with_handles();
        let mut config = (*st.config).clone();
        config.registration_enabled = false;
        st.config = std::sync::Arc::new(config);
        assert!(matches!(
            register(&st, "Admin", "a@x.com", "secret1").await,
            Err(AuthError::RegistrationClosed)
        ));
    }

    #[tokio::test]
    async fn login_without_a_mail_transport_is_a_delivery_error() {
        let (mut st, _notifier, _storage) = AppState::fake_with_handles();
        st.notifier = std::sync::Arc::new(crate::notify::UnconfiguredNotifier);
        register(&st, "Admin", "a@x.com", "secret1").await.unwrap();
        assert!(matches!(
            submit_credentials(&st, "a@x.com", "secret1").await,
            Err(AuthError::Delivery(crate::notify::NotifyError::Unconfigured))
        ));
    }
}
