use crate::handlers::statements::statement_detail;
use crate::handlers::{entitlements, parse_month, require_profile};
use crate::middleware::UserId;
use crate::models::{Card, CardWithLimit, CreateCard, Statement, StatementDetail, UpdateCard};
use crate::money::non_negative_amount;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardRequest {
    #[validate(length(min = 1, max = 80, message = "Name must be between 1 and 80 characters"))]
    pub name: String,
    #[validate(length(max = 40, message = "Brand must be at most 40 characters"))]
    pub brand: Option<String>,
    #[validate(length(max = 20, message = "Color must be at most 20 characters"))]
    pub color: Option<String>,
    #[serde(default)]
    pub credit_limit: Decimal,
    #[validate(range(min = 1, max = 31, message = "Closing day must be between 1 and 31"))]
    pub closing_day: i32,
    #[validate(range(min = 1, max = 31, message = "Due day must be between 1 and 31"))]
    pub due_day: i32,
    pub points_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCardRequest {
    #[validate(length(min = 1, max = 80, message = "Name must be between 1 and 80 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 40, message = "Brand must be at most 40 characters"))]
    pub brand: Option<String>,
    #[validate(length(max = 20, message = "Color must be at most 20 characters"))]
    pub color: Option<String>,
    pub credit_limit: Option<Decimal>,
    #[validate(range(min = 1, max = 31, message = "Closing day must be between 1 and 31"))]
    pub closing_day: Option<i32>,
    #[validate(range(min = 1, max = 31, message = "Due day must be between 1 and 31"))]
    pub due_day: Option<i32>,
    pub points_rate: Option<Decimal>,
}

/// Points per currency unit: non-negative, at most four decimal places.
fn points_rate(rate: Decimal) -> Result<Decimal, AppError> {
    let rate = rate.normalize();
    if rate < Decimal::ZERO || rate.scale() > 4 || rate >= Decimal::new(1_000_000, 0) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "points_rate must be a non-negative number with at most four decimal places"
        )));
    }
    Ok(rate)
}

async fn owned_card(state: &AppState, user_id: Uuid, card_id: Uuid) -> Result<Card, AppError> {
    state
        .db
        .get_card(user_id, card_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn create_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<CardWithLimit>), AppError> {
    request.validate()?;
    let credit_limit = non_negative_amount(request.credit_limit, "credit_limit")?;
    let points_rate = points_rate(request.points_rate.unwrap_or(Decimal::ZERO))?;

    require_profile(&state, user_id).await?;

    if let Some(limit) = entitlements(&state, user_id).await?.card_limit {
        if state.db.count_cards(user_id).await? >= limit {
            tracing::info!(limit = limit, "Card limit reached on free tier");
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Feature requires an active subscription"
            )));
        }
    }

    let card = state
        .db
        .create_card(&CreateCard {
            user_id,
            name: request.name.trim().to_string(),
            brand: request.brand,
            color: request.color,
            credit_limit,
            closing_day: request.closing_day,
            due_day: request.due_day,
            points_rate,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CardWithLimit::new(card, Decimal::ZERO)),
    ))
}

pub async fn list_cards(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Card>>, AppError> {
    Ok(Json(state.db.list_cards(user_id).await?))
}

pub async fn get_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
) -> Result<Json<CardWithLimit>, AppError> {
    let card = owned_card(&state, user_id, card_id).await?;
    let used = state.db.used_limit(card_id).await?;
    Ok(Json(CardWithLimit::new(card, used)))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, card_id = %card_id))]
pub async fn update_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
    Json(request): Json<UpdateCardRequest>,
) -> Result<Json<CardWithLimit>, AppError> {
    request.validate()?;

    let update = UpdateCard {
        name: request.name.map(|n| n.trim().to_string()),
        brand: request.brand,
        color: request.color,
        credit_limit: request
            .credit_limit
            .map(|limit| non_negative_amount(limit, "credit_limit"))
            .transpose()?,
        closing_day: request.closing_day,
        due_day: request.due_day,
        points_rate: request.points_rate.map(points_rate).transpose()?,
    };

    let card = state
        .db
        .update_card(user_id, card_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))?;
    let used = state.db.used_limit(card_id).await?;

    Ok(Json(CardWithLimit::new(card, used)))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, card_id = %card_id))]
pub async fn delete_card(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.db.delete_card(user_id, card_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Card not found")))
    }
}

pub async fn list_card_statements(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
) -> Result<Json<Vec<Statement>>, AppError> {
    owned_card(&state, user_id, card_id).await?;
    Ok(Json(state.db.list_statements(card_id).await?))
}

/// Statement of a card for `YYYY-MM`, created on first access.
pub async fn get_card_statement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((card_id, month)): Path<(Uuid, String)>,
) -> Result<Json<StatementDetail>, AppError> {
    let month = parse_month(&month)?;
    let statement = state
        .db
        .resolve_card_statement(user_id, card_id, month)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))?;

    Ok(Json(statement_detail(&state, statement).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn points_rate_bounds() {
        assert_eq!(points_rate(dec("1.5")).unwrap(), dec("1.5"));
        assert_eq!(points_rate(dec("0")).unwrap(), Decimal::ZERO);
        assert_eq!(points_rate(dec("2.25000")).unwrap(), dec("2.25"));
        assert!(points_rate(dec("-0.1")).is_err());
        assert!(points_rate(dec("0.00001")).is_err());
    }

    #[test]
    fn card_request_rejects_days_out_of_range() {
        let request: CreateCardRequest = serde_json::from_str(
            r#"{"name": "Nubank", "credit_limit": "5000.00", "closing_day": 32, "due_day": 10}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: CreateCardRequest = serde_json::from_str(
            r#"{"name": "Nubank", "closing_day": 0, "due_day": 10}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: CreateCardRequest = serde_json::from_str(
            r#"{"name": "Nubank", "closing_day": 31, "due_day": 1}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.credit_limit, Decimal::ZERO);
    }
}
