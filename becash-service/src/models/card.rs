//! Credit card model.

use crate::calendar::ReferenceMonth;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Credit card with its billing cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub card_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub credit_limit: Decimal,
    pub closing_day: i32,
    pub due_day: i32,
    pub points_rate: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Card {
    /// Closing date of the statement for `month`.
    pub fn closing_date(&self, month: ReferenceMonth) -> NaiveDate {
        month.clamp_day(self.closing_day.max(1) as u32)
    }

    /// Due date of the statement for `month`.
    pub fn due_date(&self, month: ReferenceMonth) -> NaiveDate {
        month.clamp_day(self.due_day.max(1) as u32)
    }

    /// Statement month a purchase made on `date` is billed in.
    ///
    /// Purchases up to and including the closing date belong to that month's statement; later
    /// purchases roll into the next month.
    pub fn statement_month_for(&self, date: NaiveDate) -> ReferenceMonth {
        let month = ReferenceMonth::of(date);
        if date <= self.closing_date(month) {
            month
        } else {
            month.next()
        }
    }
}

/// Input for creating a card.
#[derive(Debug, Clone)]
pub struct CreateCard {
    pub user_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub credit_limit: Decimal,
    pub closing_day: i32,
    pub due_day: i32,
    pub points_rate: Decimal,
}

/// Partial card update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateCard {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub closing_day: Option<i32>,
    pub due_day: Option<i32>,
    pub points_rate: Option<Decimal>,
}

/// Card plus the limit still available for purchases.
#[derive(Debug, Clone, Serialize)]
pub struct CardWithLimit {
    #[serde(flatten)]
    pub card: Card,
    pub used_limit: Decimal,
    pub available_limit: Decimal,
}

impl CardWithLimit {
    pub fn new(card: Card, used_limit: Decimal) -> Self {
        let available_limit = card.credit_limit - used_limit;
        Self {
            card,
            used_limit,
            available_limit,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_card(closing_day: i32, due_day: i32) -> Card {
    Card {
        card_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Nubank".to_string(),
        brand: Some("mastercard".to_string()),
        color: None,
        credit_limit: Decimal::new(5_000_00, 2),
        closing_day,
        due_day,
        points_rate: Decimal::ZERO,
        created_utc: Utc::now(),
        updated_utc: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(s: &str) -> ReferenceMonth {
        s.parse().unwrap()
    }

    #[test]
    fn statement_dates_clamp_to_month_end() {
        let card = test_card(31, 30);
        assert_eq!(card.closing_date(month("2026-02")), date(2026, 2, 28));
        assert_eq!(card.due_date(month("2026-02")), date(2026, 2, 28));
        assert_eq!(card.closing_date(month("2024-02")), date(2024, 2, 29));
        assert_eq!(card.closing_date(month("2026-04")), date(2026, 4, 30));
        assert_eq!(card.due_date(month("2026-05")), date(2026, 5, 30));
    }

    #[test]
    fn purchase_on_closing_day_stays_in_month() {
        let card = test_card(10, 20);
        assert_eq!(card.statement_month_for(date(2026, 3, 10)), month("2026-03"));
        assert_eq!(card.statement_month_for(date(2026, 3, 1)), month("2026-03"));
    }

    #[test]
    fn purchase_after_closing_rolls_into_next_month() {
        let card = test_card(10, 20);
        assert_eq!(card.statement_month_for(date(2026, 3, 11)), month("2026-04"));
        assert_eq!(card.statement_month_for(date(2026, 12, 25)), month("2027-01"));
    }

    #[test]
    fn closing_day_beyond_month_end_keeps_purchases_in_month() {
        let card = test_card(31, 5);
        assert_eq!(card.statement_month_for(date(2026, 2, 28)), month("2026-02"));
    }

    #[test]
    fn available_limit_subtracts_usage() {
        let card = test_card(10, 20);
        let with_limit = CardWithLimit::new(card, Decimal::new(1_250_50, 2));
        assert_eq!(with_limit.available_limit, Decimal::new(3_749_50, 2));
    }
}
