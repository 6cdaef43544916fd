use crate::middleware::UserId;
use crate::models::{PayStatement, Statement, StatementDetail, StatementPayment};
use crate::money::positive_amount;
use crate::services::record_statement_payment;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PayStatementRequest {
    pub amount: Decimal,
    /// Defaults to today (UTC).
    pub paid_on: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PayStatementResponse {
    pub statement: Statement,
    pub payment: StatementPayment,
    pub amount_due: Decimal,
}

/// Load a statement's entries and payments for display.
pub(crate) async fn statement_detail(
    state: &AppState,
    statement: Statement,
) -> Result<StatementDetail, AppError> {
    let charges = state
        .db
        .list_statement_charges(statement.statement_id)
        .await?;
    let payments = state
        .db
        .list_statement_payments(statement.statement_id)
        .await?;

    Ok(StatementDetail {
        amount_due: statement.amount_due(),
        statement,
        charges,
        payments,
    })
}

pub async fn get_statement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(statement_id): Path<Uuid>,
) -> Result<Json<StatementDetail>, AppError> {
    let statement = state
        .db
        .get_statement(user_id, statement_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Statement not found")))?;

    Ok(Json(statement_detail(&state, statement).await?))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, statement_id = %statement_id))]
pub async fn pay_statement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(statement_id): Path<Uuid>,
    Json(request): Json<PayStatementRequest>,
) -> Result<(StatusCode, Json<PayStatementResponse>), AppError> {
    let amount = positive_amount(request.amount, "amount")?;

    let (statement, payment) = state
        .db
        .pay_statement(&PayStatement {
            user_id,
            statement_id,
            amount,
            paid_on: request.paid_on.unwrap_or_else(|| Utc::now().date_naive()),
        })
        .await?;

    record_statement_payment(statement.is_paid());

    Ok((
        StatusCode::CREATED,
        Json(PayStatementResponse {
            amount_due: statement.amount_due(),
            statement,
            payment,
        }),
    ))
}
