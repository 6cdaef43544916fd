pub mod cards;
pub mod charges;
pub mod goals;
pub mod health;
pub mod jobs;
pub mod loyalty;
pub mod me;
pub mod statements;
pub mod subscription;
pub mod verification;

use crate::calendar::ReferenceMonth;
use crate::models::{Entitlements, Feature, User};
use crate::startup::AppState;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use service_core::error::AppError;
use uuid::Uuid;

/// Deserialize a PATCH field where `null` clears the value and an absent field keeps it.
///
/// Pair with `#[serde(default)]` so absence yields `None`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn parse_month(raw: &str) -> Result<ReferenceMonth, AppError> {
    raw.parse::<ReferenceMonth>().map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!(
            "Invalid month '{}', expected YYYY-MM",
            raw
        ))
    })
}

/// Month from an optional query parameter, defaulting to the current UTC month.
pub(crate) fn month_or_current(raw: Option<&str>) -> Result<ReferenceMonth, AppError> {
    match raw {
        Some(raw) => parse_month(raw),
        None => Ok(ReferenceMonth::current()),
    }
}

/// The caller's profile. Creation endpoints need it because every row is owned by a user.
pub(crate) async fn require_profile(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state.db.get_user(user_id).await?.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!(
            "User profile not found, create it with PUT /me"
        ))
    })
}

pub(crate) async fn entitlements(state: &AppState, user_id: Uuid) -> Result<Entitlements, AppError> {
    let subscription = state.db.get_subscription(user_id).await?;
    Ok(Entitlements::resolve(subscription.as_ref(), Utc::now()))
}

pub(crate) async fn require_feature(
    state: &AppState,
    user_id: Uuid,
    feature: Feature,
) -> Result<(), AppError> {
    if entitlements(state, user_id).await?.has(feature) {
        Ok(())
    } else {
        tracing::info!(feature = feature.as_str(), "Feature gated for free tier");
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Feature requires an active subscription"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        deadline: Option<Option<String>>,
    }

    #[test]
    fn nullable_distinguishes_absent_from_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.deadline, None);

        let cleared: Patch = serde_json::from_str(r#"{"deadline": null}"#).unwrap();
        assert_eq!(cleared.deadline, Some(None));

        let set: Patch = serde_json::from_str(r#"{"deadline": "2026-12-31"}"#).unwrap();
        assert_eq!(set.deadline, Some(Some("2026-12-31".to_string())));
    }

    #[test]
    fn month_parsing() {
        assert_eq!(parse_month("2026-03").unwrap().to_string(), "2026-03");
        assert!(matches!(parse_month("2026-13"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_month("03/2026"), Err(AppError::BadRequest(_))));
        assert_eq!(month_or_current(None).unwrap(), ReferenceMonth::current());
    }
}
