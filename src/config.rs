use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Outbound SMTP settings used for OTP and contact-form mail.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StorageBackend {
    Local,
    S3(S3Config),
    /// Nothing touches the disk; uploads vanish on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: PathBuf,
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub otp_ttl_seconds: i64,
    /// `None` when no SMTP relay is configured.
    pub mail: Option<MailConfig>,
    pub contact_recipient: String,
    pub storage: StorageConfig,
    pub allowed_origin: Option<String>,
    pub single_admin_mode: bool,
    pub registration_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "folio-admin".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "folio-admin-ui".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24),
        };

        let from_address = std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@localhost".into());
        let contact_recipient =
            std::env::var("CONTACT_RECIPIENT").unwrap_or_else(|_| from_address.clone());
        let mail = std::env::var("SMTP_HOST").ok().map(|smtp_host| MailConfig {
            smtp_host,
            smtp_port: env_parse("SMTP_PORT").unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            tls: env_flag("SMTP_TLS").unwrap_or(true),
            from_address,
        });

        let backend = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") => StorageBackend::S3(S3Config {
                endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?,
                bucket: std::env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY must be set")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY must be set")?,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            }),
            Ok("memory") => StorageBackend::Memory,
            Ok("local") | Err(_) => StorageBackend::Local,
            Ok(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };
        let storage = StorageConfig {
            backend,
            root: std::env::var("ASSET_ROOT")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            url_prefix: normalize_prefix(
                &std::env::var("ASSET_URL_PREFIX").unwrap_or_else(|_| "/uploads".into()),
            )?,
            max_upload_bytes: env_parse::<usize>("MAX_UPLOAD_MB").unwrap_or(50) * 1024 * 1024,
        };

        Ok(Self {
            database_url,
            jwt,
            otp_ttl_seconds: env_parse("OTP_TTL_SECONDS").unwrap_or(300),
            mail,
            contact_recipient,
            storage,
            allowed_origin: std::env::var("FRONTEND_BASE_URL").ok(),
            single_admin_mode: env_flag("SINGLE_ADMIN_MODE").unwrap_or(false),
            registration_enabled: env_flag("REGISTRATION_ENABLED").unwrap_or(true),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// `uploads/`, `/uploads/` and `/uploads` all become `/uploads`. The root is
/// refused since uploads cannot be served from there.
fn normalize_prefix(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    anyhow::ensure!(
        !trimmed.is_empty(),
        "ASSET_URL_PREFIX must name a path below the root, got {raw:?}"
    );
    Ok(format!("/{trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("uploads").unwrap(), "/uploads");
        assert_eq!(normalize_prefix("/uploads/").unwrap(), "/uploads");
        assert_eq!(normalize_prefix(" /media/files/ ").unwrap(), "/media/files");
    }

    #[test]
    fn root_prefix_is_refused() {
        for raw in ["/", "", " // "] {
            let err = normalize_prefix(raw).unwrap_err();
            assert!(err.to_string().contains("ASSET_URL_PREFIX"));
        }
    }
}
