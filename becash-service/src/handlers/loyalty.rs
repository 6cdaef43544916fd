use crate::handlers::require_feature;
use crate::middleware::UserId;
use crate::models::{Feature, PointsBalance, PointsEntry};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PointsRequest {
    pub points: i64,
    #[validate(length(max = 200, message = "Description must be at most 200 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PointsEntryResponse {
    pub entry: PointsEntry,
    pub balance: i64,
}

/// Owner check plus the loyalty feature gate shared by every points endpoint.
async fn authorize(state: &AppState, user_id: Uuid, card_id: Uuid) -> Result<(), AppError> {
    state
        .db
        .get_card(user_id, card_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))?;
    require_feature(state, user_id, Feature::LoyaltyPoints).await
}

pub async fn get_points(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
) -> Result<Json<PointsBalance>, AppError> {
    authorize(&state, user_id, card_id).await?;

    let balance = state.db.points_balance(card_id).await?;
    let entries = state.db.list_points_entries(card_id).await?;

    Ok(Json(PointsBalance {
        card_id,
        balance,
        entries,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, card_id = %card_id))]
pub async fn redeem_points(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
    Json(request): Json<PointsRequest>,
) -> Result<(StatusCode, Json<PointsEntryResponse>), AppError> {
    request.validate()?;
    authorize(&state, user_id, card_id).await?;

    let (entry, balance) = state
        .db
        .redeem_points(card_id, request.points, request.description)
        .await?;

    Ok((StatusCode::CREATED, Json(PointsEntryResponse { entry, balance })))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, card_id = %card_id))]
pub async fn adjust_points(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
    Json(request): Json<PointsRequest>,
) -> Result<(StatusCode, Json<PointsEntryResponse>), AppError> {
    request.validate()?;
    authorize(&state, user_id, card_id).await?;

    let (entry, balance) = state
        .db
        .adjust_points(card_id, request.points, request.description)
        .await?;

    Ok((StatusCode::CREATED, Json(PointsEntryResponse { entry, balance })))
}
