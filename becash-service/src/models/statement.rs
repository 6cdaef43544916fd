//! Card statement (fatura) model and payment rules.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Statement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Open,
    Closed,
    Paid,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementStatus::Open => "open",
            StatementStatus::Closed => "closed",
            StatementStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "closed" => StatementStatus::Closed,
            "paid" => StatementStatus::Paid,
            _ => StatementStatus::Open,
        }
    }
}

/// Monthly statement of a card.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Statement {
    pub statement_id: Uuid,
    pub card_id: Uuid,
    pub reference_month: String,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub paid_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Statement {
    pub fn status(&self) -> StatementStatus {
        StatementStatus::from_string(&self.status)
    }

    pub fn is_paid(&self) -> bool {
        self.status() == StatementStatus::Paid
    }

    pub fn amount_due(&self) -> Decimal {
        (self.total - self.amount_paid).max(Decimal::ZERO)
    }
}

/// Payment recorded against a statement. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatementPayment {
    pub payment_id: Uuid,
    pub statement_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

/// Input for paying a statement.
#[derive(Debug, Clone)]
pub struct PayStatement {
    pub user_id: Uuid,
    pub statement_id: Uuid,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
}

/// Result of applying a payment to a statement's running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub amount_paid: Decimal,
    pub settles: bool,
}

/// Apply `amount` to a statement with the given totals.
///
/// The statement settles once cumulative payments reach the total. Payments beyond the amount
/// still due are rejected so `amount_paid` never exceeds `total`.
pub fn apply_payment(
    status: StatementStatus,
    total: Decimal,
    amount_paid: Decimal,
    amount: Decimal,
) -> Result<PaymentOutcome, AppError> {
    if status == StatementStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Statement is already paid"
        )));
    }
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment amount must be greater than zero"
        )));
    }

    let due = total - amount_paid;
    if amount > due {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment amount {} exceeds amount due {}",
            amount,
            due.max(Decimal::ZERO)
        )));
    }

    let amount_paid = amount_paid + amount;
    Ok(PaymentOutcome {
        amount_paid,
        settles: amount_paid >= total,
    })
}

/// Statement with its entries and payment history.
#[derive(Debug, Clone, Serialize)]
pub struct StatementDetail {
    #[serde(flatten)]
    pub statement: Statement,
    pub amount_due: Decimal,
    pub charges: Vec<crate::models::Charge>,
    pub payments: Vec<StatementPayment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn partial_payment_keeps_statement_open() {
        let outcome =
            apply_payment(StatementStatus::Closed, dec("300.00"), dec("0"), dec("100.00")).unwrap();
        assert_eq!(outcome.amount_paid, dec("100.00"));
        assert!(!outcome.settles);
    }

    #[test]
    fn payment_covering_remainder_settles() {
        let outcome =
            apply_payment(StatementStatus::Open, dec("300.00"), dec("200.00"), dec("100.00"))
                .unwrap();
        assert_eq!(outcome.amount_paid, dec("300.00"));
        assert!(outcome.settles);
    }

    #[test]
    fn cent_exact_arithmetic_settles_without_tolerance() {
        // 0.1 + 0.2 style sums are exact with decimals.
        let mut paid = Decimal::ZERO;
        for amount in ["0.10", "0.20", "0.03"] {
            let outcome = apply_payment(StatementStatus::Open, dec("0.33"), paid, dec(amount))
                .unwrap();
            paid = outcome.amount_paid;
            if amount == "0.03" {
                assert!(outcome.settles);
            } else {
                assert!(!outcome.settles);
            }
        }
    }

    #[test]
    fn overpayment_is_rejected() {
        let err = apply_payment(StatementStatus::Open, dec("50.00"), dec("0"), dec("50.01"))
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn paid_statement_rejects_payments() {
        let err = apply_payment(StatementStatus::Paid, dec("50.00"), dec("50.00"), dec("1.00"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn non_positive_payment_is_rejected() {
        assert!(apply_payment(StatementStatus::Open, dec("50"), dec("0"), dec("0")).is_err());
        assert!(apply_payment(StatementStatus::Open, dec("50"), dec("0"), dec("-5")).is_err());
    }

    #[test]
    fn settles_iff_cumulative_payments_reach_total() {
        let total = dec("120.00");
        let mut paid = Decimal::ZERO;
        for amount in ["20.00", "40.00", "59.99", "0.01"] {
            let outcome =
                apply_payment(StatementStatus::Open, total, paid, dec(amount)).unwrap();
            paid = outcome.amount_paid;
            assert_eq!(outcome.settles, paid >= total);
        }
        assert_eq!(paid, total);
    }
}
