use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse, VerifyOtpQuery, VerifyOtpRequest},
        jwt::AuthSession,
        services,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verifyOtp", post(verify_otp))
        .route("/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;
    services::register(&state, &payload.name, &payload.email, &payload.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully! Please Login.")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(payload) = payload?;
    services::submit_credentials(&state, &payload.email, &payload.password).await?;
    Ok(Json(MessageResponse::new(
        "OTP sent to your email. Please verify to complete login.",
    )))
}

#[instrument(skip(state, query, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    query: Result<Query<VerifyOtpQuery>, QueryRejection>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Query(query) = query?;
    let Json(payload) = payload?;
    let token = services::verify_otp(&state, &query.email, &payload.otp).await?;
    Ok(Json(TokenResponse {
        message: "Login successful!".into(),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.revoke(&claims);
    info!(admin_id = %claims.sub, "session revoked");
    Ok(Json(MessageResponse::new("Logged out")))
}
