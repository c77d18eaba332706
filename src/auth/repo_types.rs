use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// The admin identity record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 PHC string, never exposed
    #[serde(skip_serializing)]
    pub otp_code: Option<i32>,      // pending one-time passcode
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<OffsetDateTime>,
    pub phone_number: Option<String>,
    pub degree: Option<String>,
    pub birthday: Option<String>,
    pub address: Option<String>,
    pub experience: Option<i32>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Admin fields editable from the profile form. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct AdminDetails {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub degree: Option<String>,
    pub birthday: Option<String>,
    pub address: Option<String>,
    pub experience: Option<i32>,
}
