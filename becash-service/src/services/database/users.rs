use super::Database;
use crate::models::{UpsertUser, User};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Create or refresh a user profile.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn upsert_user(&self, input: &UpsertUser) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, updated_utc = NOW()
            RETURNING user_id, name, email, phone, phone_verified_utc, created_utc, updated_utc
            "#,
        )
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Get a user by ID.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, email, phone, phone_verified_utc, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Record a verified phone number on the user's profile.
    #[instrument(skip(self, phone), fields(user_id = %user_id))]
    pub async fn mark_phone_verified(
        &self,
        user_id: Uuid,
        phone: &str,
    ) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_phone_verified"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET phone = $2, phone_verified_utc = NOW(), updated_utc = NOW()
            WHERE user_id = $1
            RETURNING user_id, name, email, phone, phone_verified_utc, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark phone verified: {}", e))
        })?;

        timer.observe_duration();
        if user.is_some() {
            info!("Phone number verified");
        }

        Ok(user)
    }
}
