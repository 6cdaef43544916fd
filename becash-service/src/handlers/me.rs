use crate::middleware::UserId;
use crate::models::{UpsertUser, User};
use crate::startup::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

pub async fn get_me(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<User>, AppError> {
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User profile not found")))?;
    Ok(Json(user))
}

/// Create or refresh the caller's profile. Called by the frontend on every login.
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn put_me(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<UpsertProfileRequest>,
) -> Result<Json<User>, AppError> {
    request.validate()?;

    let user = state
        .db
        .upsert_user(&UpsertUser {
            user_id,
            name: request.name.trim().to_string(),
            email: request.email.trim().to_lowercase(),
        })
        .await?;

    Ok(Json(user))
}
