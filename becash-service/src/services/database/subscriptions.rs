use super::Database;
use crate::models::{Subscription, SyncSubscription};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Get a user's subscription mirror, if any.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT user_id, plan_tier, status, current_period_end, external_customer_id, external_subscription_id, created_utc, updated_utc
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Store the state reported by the billing provider.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, tier = input.plan_tier.as_str(), status = input.status.as_str()))]
    pub async fn upsert_subscription(
        &self,
        input: &SyncSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (user_id, plan_tier, status, current_period_end, external_customer_id, external_subscription_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET plan_tier = EXCLUDED.plan_tier,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                external_customer_id = COALESCE(EXCLUDED.external_customer_id, subscriptions.external_customer_id),
                external_subscription_id = COALESCE(EXCLUDED.external_subscription_id, subscriptions.external_subscription_id),
                updated_utc = NOW()
            RETURNING user_id, plan_tier, status, current_period_end, external_customer_id, external_subscription_id, created_utc, updated_utc
            "#,
        )
        .bind(input.user_id)
        .bind(input.plan_tier.as_str())
        .bind(input.status.as_str())
        .bind(input.current_period_end)
        .bind(&input.external_customer_id)
        .bind(&input.external_subscription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sync subscription: {}", e)))?;

        timer.observe_duration();
        info!("Subscription synced");

        Ok(subscription)
    }

    /// Mark a user's subscription canceled after the provider deleted it.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn cancel_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', updated_utc = NOW()
            WHERE user_id = $1
            RETURNING user_id, plan_tier, status, current_period_end, external_customer_id, external_subscription_id, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel subscription: {}", e)))?;

        timer.observe_duration();
        if subscription.is_some() {
            info!("Subscription canceled");
        }

        Ok(subscription)
    }
}
