use crate::handlers::{month_or_current, nullable, parse_month, require_profile};
use crate::middleware::UserId;
use crate::models::{
    Charge, ChargeKind, ListChargesFilter, MonthlySummary, NewCharge, UpdateCharge,
};
use crate::money::positive_amount;
use crate::services::record_charge_created;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChargeRequest {
    #[validate(length(min = 1, max = 200, message = "Description must be between 1 and 200 characters"))]
    pub description: String,
    pub amount: Decimal,
    pub kind: ChargeKind,
    #[validate(length(max = 60, message = "Category must be at most 60 characters"))]
    pub category: Option<String>,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub is_paid: bool,
    pub card_id: Option<Uuid>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_end: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateChargeRequest {
    #[validate(length(min = 1, max = 200, message = "Description must be between 1 and 200 characters"))]
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    /// `null` or a blank string clears the category.
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    pub occurred_on: Option<NaiveDate>,
    pub is_paid: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub card_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub recurrence_end: Option<Option<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
pub struct ListChargesQuery {
    pub month: Option<String>,
    pub kind: Option<ChargeKind>,
    pub card_id: Option<Uuid>,
    pub paid: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub month: Option<String>,
}

impl CreateChargeRequest {
    /// Checks the request against the entry rules that need no database access.
    fn into_new_charge(self, user_id: Uuid) -> Result<NewCharge, AppError> {
        let amount = positive_amount(self.amount, "amount")?;

        if let Some(end) = self.recurrence_end {
            if !self.is_recurring {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "recurrence_end requires is_recurring"
                )));
            }
            if end < self.occurred_on {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "recurrence_end must not precede occurred_on"
                )));
            }
        }
        if self.card_id.is_some() && self.is_paid {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Card entries are settled by paying their statement"
            )));
        }

        Ok(NewCharge {
            user_id,
            description: self.description.trim().to_string(),
            amount,
            kind: self.kind,
            category: self.category,
            occurred_on: self.occurred_on,
            is_paid: self.is_paid,
            card_id: self.card_id,
            is_recurring: self.is_recurring,
            recurrence_end: self.recurrence_end,
            parent_id: None,
        })
    }
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn create_charge(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateChargeRequest>,
) -> Result<(StatusCode, Json<Charge>), AppError> {
    request.validate()?;
    let input = request.into_new_charge(user_id)?;

    require_profile(&state, user_id).await?;

    let charge = state.db.create_charge(&input).await?;
    record_charge_created(input.kind.as_str(), "user");

    Ok((StatusCode::CREATED, Json(charge)))
}

pub async fn list_charges(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<ListChargesQuery>,
) -> Result<Json<Vec<Charge>>, AppError> {
    let filter = ListChargesFilter {
        month: query.month.as_deref().map(parse_month).transpose()?,
        kind: query.kind,
        card_id: query.card_id,
        is_paid: query.paid,
    };

    Ok(Json(state.db.list_charges(user_id, &filter).await?))
}

pub async fn get_charge(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<Charge>, AppError> {
    let charge = state
        .db
        .get_charge(user_id, charge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Entry not found")))?;
    Ok(Json(charge))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, charge_id = %charge_id))]
pub async fn update_charge(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(charge_id): Path<Uuid>,
    Json(request): Json<UpdateChargeRequest>,
) -> Result<Json<Charge>, AppError> {
    request.validate()?;

    let update = UpdateCharge {
        description: request.description.map(|d| d.trim().to_string()),
        amount: request
            .amount
            .map(|amount| positive_amount(amount, "amount"))
            .transpose()?,
        category: request.category.map(category_patch).transpose()?,
        occurred_on: request.occurred_on,
        is_paid: request.is_paid,
        card_id: request.card_id,
        recurrence_end: request.recurrence_end,
    };

    let charge = state
        .db
        .update_charge(user_id, charge_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Entry not found")))?;

    Ok(Json(charge))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, charge_id = %charge_id))]
pub async fn delete_charge(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(charge_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.db.delete_charge(user_id, charge_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Entry not found")))
    }
}

pub async fn monthly_summary(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<MonthlySummary>, AppError> {
    let month = month_or_current(query.month.as_deref())?;
    Ok(Json(state.db.monthly_summary(user_id, month).await?))
}

fn category_patch(category: Option<String>) -> Result<Option<String>, AppError> {
    let category = category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if category.as_ref().is_some_and(|c| c.chars().count() > 60) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Category must be at most 60 characters"
        )));
    }
    Ok(category)
}
