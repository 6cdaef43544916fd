//! Card loyalty points ledger.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsReason {
    Accrual,
    Redemption,
    Adjustment,
}

impl PointsReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsReason::Accrual => "accrual",
            PointsReason::Redemption => "redemption",
            PointsReason::Adjustment => "adjustment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsEntry {
    pub entry_id: Uuid,
    pub card_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub points: i64,
    pub reason: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPointsEntry {
    pub card_id: Uuid,
    pub statement_id: Option<Uuid>,
    pub points: i64,
    pub reason: PointsReason,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsBalance {
    pub card_id: Uuid,
    pub balance: i64,
    pub entries: Vec<PointsEntry>,
}

/// Points earned for a settled statement: `floor(total * rate)`, never negative.
pub fn accrual_points(total: Decimal, rate: Decimal) -> i64 {
    (total * rate)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .max(0)
}
