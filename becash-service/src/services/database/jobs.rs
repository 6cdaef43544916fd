use super::statements::resolve_statement;
use super::Database;
use crate::calendar::ReferenceMonth;
use crate::models::{Card, Charge, Statement};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};

impl Database {
    // =========================================================================
    // Scheduled Job Operations
    // =========================================================================

    /// Recurring roots that may need an instance in `month`.
    #[instrument(skip(self), fields(month = %month))]
    pub async fn list_recurring_roots(&self, month: ReferenceMonth) -> Result<Vec<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_recurring_roots"])
            .start_timer();

        let roots = sqlx::query_as::<_, Charge>(
            r#"
            SELECT charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
            FROM charges
            WHERE is_recurring = TRUE
              AND parent_id IS NULL
              AND occurrence_month < $1
              AND (recurrence_end IS NULL OR recurrence_end >= $2)
            ORDER BY created_utc, charge_id
            "#,
        )
        .bind(month.to_string())
        .bind(month.first_day())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list recurring roots: {}", e))
        })?;

        timer.observe_duration();

        Ok(roots)
    }

    /// Move every open statement of `month` to closed. Returns the number closed.
    #[instrument(skip(self), fields(month = %month))]
    pub async fn close_open_statements(&self, month: ReferenceMonth) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["close_open_statements"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE statements
            SET status = 'closed', updated_utc = NOW()
            WHERE reference_month = $1 AND status = 'open'
            "#,
        )
        .bind(month.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to close statements: {}", e)))?;

        timer.observe_duration();
        info!(closed = result.rows_affected(), "Statements closed");

        Ok(result.rows_affected())
    }

    /// Make sure `card` has a statement for `month`.
    #[instrument(skip(self, card), fields(card_id = %card.card_id, month = %month))]
    pub async fn ensure_statement(
        &self,
        card: &Card,
        month: ReferenceMonth,
    ) -> Result<Statement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_statement"])
            .start_timer();

        let mut conn = super::acquire(&self.pool).await?;
        let statement = resolve_statement(&mut conn, card, month).await?;

        timer.observe_duration();

        Ok(statement)
    }
}
