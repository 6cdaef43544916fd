use super::Database;
use crate::models::{Card, CreateCard, UpdateCard};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    // =========================================================================
    // Card Operations
    // =========================================================================

    /// Create a new card.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_card(&self, input: &CreateCard) -> Result<Card, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_card"])
            .start_timer();

        let card_id = Uuid::new_v4();
        let card = sqlx::query_as::<_, Card>(
            r#"
            INSERT INTO cards (card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate, created_utc, updated_utc
            "#,
        )
        .bind(card_id)
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.brand)
        .bind(&input.color)
        .bind(input.credit_limit)
        .bind(input.closing_day)
        .bind(input.due_day)
        .bind(input.points_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create card: {}", e)))?;

        timer.observe_duration();
        info!(card_id = %card.card_id, name = %card.name, "Card created");

        Ok(card)
    }

    /// Get a card owned by `user_id`.
    #[instrument(skip(self), fields(user_id = %user_id, card_id = %card_id))]
    pub async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<Card>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_card"])
            .start_timer();

        let mut conn = super::acquire(&self.pool).await?;
        let card = fetch_card(&mut conn, user_id, card_id).await?;

        timer.observe_duration();

        Ok(card)
    }

    /// List a user's cards.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_cards(&self, user_id: Uuid) -> Result<Vec<Card>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_cards"])
            .start_timer();

        let cards = sqlx::query_as::<_, Card>(
            r#"
            SELECT card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate, created_utc, updated_utc
            FROM cards
            WHERE user_id = $1
            ORDER BY created_utc, card_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list cards: {}", e)))?;

        timer.observe_duration();

        Ok(cards)
    }

    /// List every card, for scheduled jobs.
    #[instrument(skip(self))]
    pub async fn list_all_cards(&self) -> Result<Vec<Card>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_all_cards"])
            .start_timer();

        let cards = sqlx::query_as::<_, Card>(
            r#"
            SELECT card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate, created_utc, updated_utc
            FROM cards
            ORDER BY card_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list all cards: {}", e)))?;

        timer.observe_duration();

        Ok(cards)
    }

    /// Count a user's cards.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn count_cards(&self, user_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_cards"])
            .start_timer();

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cards WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count cards: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Sum of unpaid expenses charged to a card.
    #[instrument(skip(self), fields(card_id = %card_id))]
    pub async fn used_limit(&self, card_id: Uuid) -> Result<Decimal, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["used_limit"])
            .start_timer();

        let used = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM charges
            WHERE card_id = $1 AND kind = 'expense' AND is_paid = FALSE
            "#,
        )
        .bind(card_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute used limit: {}", e)))?;

        timer.observe_duration();

        Ok(used)
    }

    /// Update a card. Open statements pick up new cycle days the next time they are resolved.
    #[instrument(skip(self, input), fields(user_id = %user_id, card_id = %card_id))]
    pub async fn update_card(
        &self,
        user_id: Uuid,
        card_id: Uuid,
        input: &UpdateCard,
    ) -> Result<Option<Card>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_card"])
            .start_timer();

        let card = sqlx::query_as::<_, Card>(
            r#"
            UPDATE cards
            SET name = COALESCE($3, name),
                brand = COALESCE($4, brand),
                color = COALESCE($5, color),
                credit_limit = COALESCE($6, credit_limit),
                closing_day = COALESCE($7, closing_day),
                due_day = COALESCE($8, due_day),
                points_rate = COALESCE($9, points_rate),
                updated_utc = NOW()
            WHERE user_id = $1 AND card_id = $2
            RETURNING card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(card_id)
        .bind(&input.name)
        .bind(&input.brand)
        .bind(&input.color)
        .bind(input.credit_limit)
        .bind(input.closing_day)
        .bind(input.due_day)
        .bind(input.points_rate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update card: {}", e)))?;

        timer.observe_duration();

        Ok(card)
    }

    /// Delete a card. Its statements go with it; its charges lose the link.
    #[instrument(skip(self), fields(user_id = %user_id, card_id = %card_id))]
    pub async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_card"])
            .start_timer();

        let result = sqlx::query("DELETE FROM cards WHERE user_id = $1 AND card_id = $2")
            .bind(user_id)
            .bind(card_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete card: {}", e)))?;

        timer.observe_duration();
        if result.rows_affected() > 0 {
            info!("Card deleted");
        }

        Ok(result.rows_affected() > 0)
    }
}

pub(super) async fn fetch_card(
    conn: &mut PgConnection,
    user_id: Uuid,
    card_id: Uuid,
) -> Result<Option<Card>, AppError> {
    sqlx::query_as::<_, Card>(
        r#"
        SELECT card_id, user_id, name, brand, color, credit_limit, closing_day, due_day, points_rate, created_utc, updated_utc
        FROM cards
        WHERE user_id = $1 AND card_id = $2
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get card: {}", e)))
}
