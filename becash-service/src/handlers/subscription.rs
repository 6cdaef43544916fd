use crate::handlers::entitlements;
use crate::middleware::{InternalAuth, UserId};
use crate::models::{PlanTier, Subscription, SubscriptionStatus, SubscriptionView, SyncSubscription};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// Normalized subscription state pushed by the billing integration.
#[derive(Debug, Deserialize, Validate)]
pub struct SyncSubscriptionRequest {
    pub plan_tier: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 255))]
    pub external_customer_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub external_subscription_id: Option<String>,
}

pub async fn get_subscription(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<SubscriptionView>, AppError> {
    let subscription = state.db.get_subscription(user_id).await?;
    let entitlements = entitlements(&state, user_id).await?;

    Ok(Json(SubscriptionView {
        subscription,
        entitlements,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn sync_subscription(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SyncSubscriptionRequest>,
) -> Result<Json<Subscription>, AppError> {
    request.validate()?;

    if state.db.get_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    let subscription = state
        .db
        .upsert_subscription(&SyncSubscription {
            user_id,
            plan_tier: request.plan_tier,
            status: request.status,
            current_period_end: request.current_period_end,
            external_customer_id: request.external_customer_id,
            external_subscription_id: request.external_subscription_id,
        })
        .await?;

    Ok(Json(subscription))
}

/// The provider deleted the subscription: keep the row, mark it canceled.
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn cancel_subscription(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = state
        .db
        .cancel_subscription(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

    Ok(Json(subscription))
}
