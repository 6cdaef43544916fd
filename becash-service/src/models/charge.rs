//! Income/expense entry (lançamento) model.

use crate::calendar::ReferenceMonth;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Income,
    Expense,
}

impl ChargeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeKind::Income => "income",
            ChargeKind::Expense => "expense",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "income" => ChargeKind::Income,
            _ => ChargeKind::Expense,
        }
    }
}

/// A single income or expense record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Charge {
    pub charge_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub kind: String,
    pub category: Option<String>,
    pub occurred_on: NaiveDate,
    pub occurrence_month: String,
    pub is_paid: bool,
    pub card_id: Option<Uuid>,
    pub statement_id: Option<Uuid>,
    pub is_recurring: bool,
    pub recurrence_end: Option<NaiveDate>,
    pub parent_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Charge {
    pub fn kind(&self) -> ChargeKind {
        ChargeKind::from_string(&self.kind)
    }

    /// Whether this entry is a recurring root that should get an instance in `month`.
    ///
    /// Roots repeat in months strictly after their own, until `recurrence_end` (inclusive of the
    /// month containing it).
    pub fn recurs_in(&self, month: ReferenceMonth) -> bool {
        if !self.is_recurring || self.parent_id.is_some() {
            return false;
        }
        if ReferenceMonth::of(self.occurred_on) >= month {
            return false;
        }
        match self.recurrence_end {
            Some(end) => end >= month.first_day(),
            None => true,
        }
    }

    /// The instance of this recurring root for `month`. The card statement is resolved later.
    pub fn instance_for(&self, month: ReferenceMonth) -> NewCharge {
        NewCharge {
            user_id: self.user_id,
            description: self.description.clone(),
            amount: self.amount,
            kind: self.kind(),
            category: self.category.clone(),
            occurred_on: month.clamp_day(self.occurred_on.day()),
            is_paid: false,
            card_id: self.card_id,
            is_recurring: false,
            recurrence_end: None,
            parent_id: Some(self.charge_id),
        }
    }
}

/// Input for inserting an entry.
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub user_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub kind: ChargeKind,
    pub category: Option<String>,
    pub occurred_on: NaiveDate,
    pub is_paid: bool,
    pub card_id: Option<Uuid>,
    pub is_recurring: bool,
    pub recurrence_end: Option<NaiveDate>,
    pub parent_id: Option<Uuid>,
}

impl NewCharge {
    pub fn occurrence_month(&self) -> ReferenceMonth {
        ReferenceMonth::of(self.occurred_on)
    }
}

/// Partial entry update. `Some(None)` clears a nullable field, e.g. detaches the card.
#[derive(Debug, Clone, Default)]
pub struct UpdateCharge {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<Option<String>>,
    pub occurred_on: Option<NaiveDate>,
    pub is_paid: Option<bool>,
    pub card_id: Option<Option<Uuid>>,
    pub recurrence_end: Option<Option<NaiveDate>>,
}

/// Filter parameters for listing entries.
#[derive(Debug, Clone, Default)]
pub struct ListChargesFilter {
    pub month: Option<ReferenceMonth>,
    pub kind: Option<ChargeKind>,
    pub card_id: Option<Uuid>,
    pub is_paid: Option<bool>,
}

/// Totals for one month of a user's entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonthlySummary {
    pub month: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
    pub unpaid_expense: Decimal,
    pub entries: i64,
}
