use super::require_profile;
use crate::middleware::UserId;
use crate::services::{record_verification, SentCode};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    pub phone: String,
    #[validate(length(min = 1, max = 12, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub verified: bool,
    pub phone: String,
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn send_code(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<SendCodeRequest>,
) -> Result<(StatusCode, Json<SentCode>), AppError> {
    require_profile(&state, user_id).await?;
    let phone = request.phone.trim();
    let sent = state.verification.send(user_id, phone).await.map_err(|e| {
        record_verification(outcome(&e, "send_rejected"));
        e
    })?;

    record_verification("sent");
    Ok((StatusCode::ACCEPTED, Json(sent)))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn verify_code(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, AppError> {
    request.validate()?;
    // Checked before the code is consumed.
    require_profile(&state, user_id).await?;
    let phone = request.phone.trim();

    if let Err(e) = state.verification.verify(user_id, phone, &request.code).await {
        record_verification(outcome(&e, "incorrect"));
        return Err(e);
    }

    state
        .db
        .mark_phone_verified(user_id, phone)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User profile not found")))?;

    record_verification("verified");
    Ok(Json(VerifyCodeResponse {
        verified: true,
        phone: phone.to_string(),
    }))
}

fn outcome(error: &AppError, fallback: &'static str) -> &'static str {
    match error {
        AppError::Gone(_) => "expired",
        AppError::TooManyRequests(_, Some(_)) => "throttled",
        AppError::TooManyRequests(_, None) => "locked",
        _ => fallback,
    }
}
