use serde::{Deserialize, Serialize};

/// Request body for admin registration. Accepts the field names the portfolio
/// front end already sends (`adminName`, ...).
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "adminName")]
    pub name: String,
    #[serde(alias = "adminEmail")]
    pub email: String,
    #[serde(alias = "adminPassword")]
    pub password: String,
}

/// Request body for login step one.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpQuery {
    pub email: String,
}

/// The code may arrive as a number or a numeric string.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Returned once the OTP checks out.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: String,
    pub token: String,
}
