use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No token provided")]
    TokenMissing,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token revoked")]
    TokenRevoked,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // admin ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
    pub jti: Uuid,   // token ID, the revocation key
}

/// Token IDs revoked before their natural expiry.
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: Mutex<HashMap<Uuid, usize>>,
}

impl RevocationList {
    /// A panic elsewhere while holding the lock leaves the map itself intact,
    /// so a poisoned lock is recovered rather than skipped.
    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, usize>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn revoke(&self, jti: Uuid, exp: usize) {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let mut entries = self.entries();
        entries.retain(|_, until| *until > now);
        entries.insert(jti, exp);
    }

    pub fn is_revoked(&self, jti: &Uuid) -> bool {
        self.entries().contains_key(jti)
    }
}

/// Signs and checks session tokens with the process-wide secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    revoked: Arc<RevocationList>,
}

impl SessionKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            revoked: Arc::new(RevocationList::default()),
        }
    }

    pub fn issue(&self, admin_id: Uuid) -> Result<String, SessionError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: admin_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))?;
        debug!(admin_id = %admin_id, jti = %claims.jti, "session token issued");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::TokenExpired,
                _ => SessionError::TokenInvalid,
            }
        })?;
        if self.revoked.is_revoked(&data.claims.jti) {
            return Err(SessionError::TokenRevoked);
        }
        debug!(admin_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }

    pub fn revoke(&self, claims: &Claims) {
        self.revoked.revoke(claims.jti, claims.exp);
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, SessionError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| SessionError::TokenInvalid)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(SessionError::TokenInvalid)?;
    if token.is_empty() {
        return Err(SessionError::TokenMissing);
    }
    Ok(Some(token))
}

/// Verified session claims of the calling admin.
pub struct AuthSession(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(SessionError::TokenMissing)?;
        let claims = SessionKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(reason = %e, "rejected session token");
            e
        })?;
        Ok(AuthSession(claims))
    }
}

/// ID of the authenticated admin; rejects with 401 before the handler runs.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthSession(claims) = AuthSession::from_request_parts(parts, state).await?;
        Ok(AuthUser(claims.sub))
    }
}

/// Like [`AuthUser`] for public reads: no header means anonymous, but a
/// header carrying a bad token is still rejected.
pub struct MaybeAuthUser(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => {
                let claims = SessionKeys::from_ref(state).verify(token)?;
                Ok(MaybeAuthUser(Some(claims.sub)))
            }
        }
    }
}
