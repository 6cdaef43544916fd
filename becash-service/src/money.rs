//! Monetary amount validation.
//!
//! Amounts are exact decimals with at most two fractional digits (cents). Everything the API
//! accepts goes through these checks before touching the database.

use rust_decimal::Decimal;
use service_core::error::AppError;

/// Largest value a `NUMERIC(14, 2)` column holds.
fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

fn check_scale(amount: Decimal, field: &str) -> Result<Decimal, AppError> {
    let normalized = amount.normalize();
    if normalized.scale() > 2 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must have at most two decimal places",
            field
        )));
    }
    if normalized.abs() > max_amount() {
        return Err(AppError::BadRequest(anyhow::anyhow!("{} is too large", field)));
    }
    let mut cents = normalized;
    cents.rescale(2);
    Ok(cents)
}

/// A strictly positive amount in cents precision.
pub fn positive_amount(amount: Decimal, field: &str) -> Result<Decimal, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must be greater than zero",
            field
        )));
    }
    check_scale(amount, field)
}

/// A non-negative amount in cents precision.
pub fn non_negative_amount(amount: Decimal, field: &str) -> Result<Decimal, AppError> {
    if amount < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be negative",
            field
        )));
    }
    check_scale(amount, field)
}

/// A signed, non-zero amount in cents precision.
pub fn non_zero_amount(amount: Decimal, field: &str) -> Result<Decimal, AppError> {
    if amount.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be zero",
            field
        )));
    }
    check_scale(amount, field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn max_amount_is_numeric_14_2_upper_bound() {
        assert_eq!(max_amount(), dec("999999999999.99"));
    }

    #[test]
    fn accepts_cents() {
        let amount = positive_amount(dec("10.5"), "amount").unwrap();
        assert_eq!(amount, dec("10.50"));
        assert_eq!(amount.to_string(), "10.50");
        assert_eq!(positive_amount(dec("0.01"), "amount").unwrap(), dec("0.01"));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        assert_eq!(positive_amount(dec("12.3400"), "amount").unwrap(), dec("12.34"));
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert!(matches!(
            positive_amount(dec("0.001"), "amount"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_zero_and_negative_where_positive_required() {
        assert!(positive_amount(Decimal::ZERO, "amount").is_err());
        assert!(positive_amount(dec("-1"), "amount").is_err());
    }

    #[test]
    fn non_negative_allows_zero() {
        assert_eq!(non_negative_amount(Decimal::ZERO, "limit").unwrap(), Decimal::ZERO);
        assert!(non_negative_amount(dec("-0.01"), "limit").is_err());
    }

    #[test]
    fn signed_amounts() {
        assert_eq!(non_zero_amount(dec("-25.00"), "amount").unwrap(), dec("-25"));
        assert!(non_zero_amount(Decimal::ZERO, "amount").is_err());
    }

    #[test]
    fn rejects_values_beyond_column_range() {
        assert!(positive_amount(dec("1000000000000.00"), "amount").is_err());
    }
}
