//! Subscription model and plan entitlements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cards a free account may hold.
pub const FREE_CARD_LIMIT: i64 = 2;

/// Plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Premium,
    Family,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
            PlanTier::Family => "family",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "premium" => PlanTier::Premium,
            "family" => PlanTier::Family,
            _ => PlanTier::Free,
        }
    }
}

/// Subscription status as reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "incomplete" => SubscriptionStatus::Incomplete,
            _ => SubscriptionStatus::Canceled,
        }
    }

    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

/// Gated feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SharedGoals,
    LoyaltyPoints,
    UnlimitedCards,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::SharedGoals => "shared_goals",
            Feature::LoyaltyPoints => "loyalty_points",
            Feature::UnlimitedCards => "unlimited_cards",
        }
    }
}

/// Local mirror of the user's billing subscription.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan_tier: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Normalized subscription state pushed by the billing integration.
#[derive(Debug, Clone)]
pub struct SyncSubscription {
    pub user_id: Uuid,
    pub plan_tier: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
}

/// What a user may do under their current subscription.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Entitlements {
    pub tier: PlanTier,
    pub features: Vec<Feature>,
    pub card_limit: Option<i64>,
}

impl Entitlements {
    /// Effective entitlements: a subscription only counts while its status grants access and
    /// its period has not ended.
    pub fn resolve(subscription: Option<&Subscription>, now: DateTime<Utc>) -> Self {
        let tier = subscription
            .filter(|s| SubscriptionStatus::from_string(&s.status).grants_access())
            .filter(|s| s.current_period_end.map_or(true, |end| end > now))
            .map(|s| PlanTier::from_string(&s.plan_tier))
            .unwrap_or(PlanTier::Free);

        match tier {
            PlanTier::Free => Self {
                tier,
                features: Vec::new(),
                card_limit: Some(FREE_CARD_LIMIT),
            },
            PlanTier::Premium | PlanTier::Family => Self {
                tier,
                features: vec![
                    Feature::SharedGoals,
                    Feature::LoyaltyPoints,
                    Feature::UnlimitedCards,
                ],
                card_limit: None,
            },
        }
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// Subscription row (if any) with its effective entitlements.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub subscription: Option<Subscription>,
    pub entitlements: Entitlements,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(tier: &str, status: &str, period_end: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            user_id: Uuid::new_v4(),
            plan_tier: tier.to_string(),
            status: status.to_string(),
            current_period_end: period_end,
            external_customer_id: Some("cus_123".to_string()),
            external_subscription_id: Some("sub_123".to_string()),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn no_subscription_is_free() {
        let e = Entitlements::resolve(None, Utc::now());
        assert_eq!(e.tier, PlanTier::Free);
        assert_eq!(e.card_limit, Some(FREE_CARD_LIMIT));
        assert!(!e.has(Feature::SharedGoals));
    }

    #[test]
    fn active_premium_unlocks_everything() {
        let now = Utc::now();
        let sub = subscription("premium", "active", Some(now + Duration::days(10)));
        let e = Entitlements::resolve(Some(&sub), now);
        assert_eq!(e.tier, PlanTier::Premium);
        assert!(e.has(Feature::SharedGoals));
        assert!(e.has(Feature::LoyaltyPoints));
        assert!(e.has(Feature::UnlimitedCards));
        assert_eq!(e.card_limit, None);
    }

    #[test]
    fn trialing_family_counts() {
        let sub = subscription("family", "trialing", None);
        assert_eq!(
            Entitlements::resolve(Some(&sub), Utc::now()).tier,
            PlanTier::Family
        );
    }

    #[test]
    fn lapsed_or_inactive_subscriptions_fall_back_to_free() {
        let now = Utc::now();
        for sub in [
            subscription("premium", "past_due", None),
            subscription("premium", "canceled", None),
            subscription("premium", "incomplete", None),
            subscription("premium", "active", Some(now - Duration::seconds(1))),
        ] {
            assert_eq!(Entitlements::resolve(Some(&sub), now).tier, PlanTier::Free);
        }
    }
}
