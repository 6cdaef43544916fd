use super::{commit, loyalty, Database};
use crate::calendar::ReferenceMonth;
use crate::models::{
    apply_payment, Card, Charge, PayStatement, Statement, StatementPayment,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

impl Database {
    // =========================================================================
    // Statement Operations
    // =========================================================================

    /// Get or create the statement of one of the user's cards for `month`.
    #[instrument(skip(self), fields(user_id = %user_id, card_id = %card_id, month = %month))]
    pub async fn resolve_card_statement(
        &self,
        user_id: Uuid,
        card_id: Uuid,
        month: ReferenceMonth,
    ) -> Result<Option<Statement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_card_statement"])
            .start_timer();

        let mut conn = super::acquire(&self.pool).await?;
        let Some(card) = super::cards::fetch_card(&mut conn, user_id, card_id).await? else {
            return Ok(None);
        };
        let statement = resolve_statement(&mut conn, &card, month).await?;

        timer.observe_duration();

        Ok(Some(statement))
    }

    /// List a card's statements, newest month first.
    #[instrument(skip(self), fields(card_id = %card_id))]
    pub async fn list_statements(&self, card_id: Uuid) -> Result<Vec<Statement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_statements"])
            .start_timer();

        let statements = sqlx::query_as::<_, Statement>(
            r#"
            SELECT statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
            FROM statements
            WHERE card_id = $1
            ORDER BY reference_month DESC
            "#,
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list statements: {}", e)))?;

        timer.observe_duration();

        Ok(statements)
    }

    /// Get a statement belonging to one of the user's cards.
    #[instrument(skip(self), fields(user_id = %user_id, statement_id = %statement_id))]
    pub async fn get_statement(
        &self,
        user_id: Uuid,
        statement_id: Uuid,
    ) -> Result<Option<Statement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_statement"])
            .start_timer();

        let statement = sqlx::query_as::<_, Statement>(
            r#"
            SELECT s.statement_id, s.card_id, s.reference_month, s.closing_date, s.due_date, s.total, s.amount_paid, s.status, s.paid_utc, s.created_utc, s.updated_utc
            FROM statements s
            JOIN cards c ON c.card_id = s.card_id
            WHERE s.statement_id = $1 AND c.user_id = $2
            "#,
        )
        .bind(statement_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get statement: {}", e)))?;

        timer.observe_duration();

        Ok(statement)
    }

    /// Charges linked to a statement.
    #[instrument(skip(self), fields(statement_id = %statement_id))]
    pub async fn list_statement_charges(
        &self,
        statement_id: Uuid,
    ) -> Result<Vec<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_statement_charges"])
            .start_timer();

        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
            FROM charges
            WHERE statement_id = $1
            ORDER BY occurred_on, created_utc
            "#,
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list statement charges: {}", e))
        })?;

        timer.observe_duration();

        Ok(charges)
    }

    /// Payment history of a statement.
    #[instrument(skip(self), fields(statement_id = %statement_id))]
    pub async fn list_statement_payments(
        &self,
        statement_id: Uuid,
    ) -> Result<Vec<StatementPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_statement_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, StatementPayment>(
            r#"
            SELECT payment_id, statement_id, user_id, amount, paid_on, created_utc
            FROM statement_payments
            WHERE statement_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list statement payments: {}", e))
        })?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Apply a payment to a statement.
    ///
    /// Runs in one transaction with the statement row locked. When cumulative payments reach
    /// the total the statement settles: linked charges are flagged paid and points accrue.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, statement_id = %input.statement_id))]
    pub async fn pay_statement(
        &self,
        input: &PayStatement,
    ) -> Result<(Statement, StatementPayment), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["pay_statement"])
            .start_timer();

        let mut tx = self.begin().await?;

        let statement = sqlx::query_as::<_, Statement>(
            r#"
            SELECT s.statement_id, s.card_id, s.reference_month, s.closing_date, s.due_date, s.total, s.amount_paid, s.status, s.paid_utc, s.created_utc, s.updated_utc
            FROM statements s
            JOIN cards c ON c.card_id = s.card_id
            WHERE s.statement_id = $1 AND c.user_id = $2
            FOR UPDATE OF s
            "#,
        )
        .bind(input.statement_id)
        .bind(input.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock statement: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Statement not found")))?;

        let outcome = apply_payment(
            statement.status(),
            statement.total,
            statement.amount_paid,
            input.amount,
        )?;

        let payment = sqlx::query_as::<_, StatementPayment>(
            r#"
            INSERT INTO statement_payments (payment_id, statement_id, user_id, amount, paid_on)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING payment_id, statement_id, user_id, amount, paid_on, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.statement_id)
        .bind(input.user_id)
        .bind(input.amount)
        .bind(input.paid_on)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        let updated = sqlx::query_as::<_, Statement>(
            r#"
            UPDATE statements
            SET amount_paid = $2, updated_utc = NOW()
            WHERE statement_id = $1
            RETURNING statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
            "#,
        )
        .bind(input.statement_id)
        .bind(outcome.amount_paid)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update statement: {}", e)))?;

        let statement = if outcome.settles {
            settle_statement(&mut tx, updated).await?
        } else {
            updated
        };

        commit(tx).await?;
        timer.observe_duration();

        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            amount_paid = %statement.amount_paid,
            status = %statement.status,
            "Statement payment applied"
        );

        Ok((statement, payment))
    }
}

/// Get or create the statement of `card` for `month`.
///
/// Open statements follow the card's current cycle days; closed and paid statements keep the
/// dates they were issued with.
pub(super) async fn resolve_statement(
    conn: &mut PgConnection,
    card: &Card,
    month: ReferenceMonth,
) -> Result<Statement, AppError> {
    sqlx::query_as::<_, Statement>(
        r#"
        INSERT INTO statements (statement_id, card_id, reference_month, closing_date, due_date)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (card_id, reference_month) DO UPDATE
        SET closing_date = CASE WHEN statements.status = 'open' THEN EXCLUDED.closing_date ELSE statements.closing_date END,
            due_date = CASE WHEN statements.status = 'open' THEN EXCLUDED.due_date ELSE statements.due_date END
        RETURNING statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(card.card_id)
    .bind(month.to_string())
    .bind(card.closing_date(month))
    .bind(card.due_date(month))
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve statement: {}", e)))
}

/// Recompute a statement's total from its unpaid expense charges.
///
/// Paid statements are frozen. A statement with partial payments settles once the total drops
/// to what was already paid; dropping below it is rejected.
pub(super) async fn recompute_total(
    conn: &mut PgConnection,
    statement_id: Uuid,
) -> Result<Statement, AppError> {
    let statement = sqlx::query_as::<_, Statement>(
        r#"
        SELECT statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
        FROM statements
        WHERE statement_id = $1
        FOR UPDATE
        "#,
    )
    .bind(statement_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock statement: {}", e)))?;

    if statement.is_paid() {
        return Ok(statement);
    }

    let total = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM charges
        WHERE statement_id = $1 AND kind = 'expense' AND is_paid = FALSE
        "#,
    )
    .bind(statement_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum statement: {}", e)))?;

    if total < statement.amount_paid {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Statement total {} would fall below the {} already paid",
            total,
            statement.amount_paid
        )));
    }

    let updated = sqlx::query_as::<_, Statement>(
        r#"
        UPDATE statements
        SET total = $2, updated_utc = NOW()
        WHERE statement_id = $1
        RETURNING statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
        "#,
    )
    .bind(statement_id)
    .bind(total)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update total: {}", e)))?;

    if updated.amount_paid > Decimal::ZERO && updated.amount_paid >= updated.total {
        warn!(
            statement_id = %statement_id,
            "Statement total dropped to the amount already paid, settling"
        );
        return settle_statement(conn, updated).await;
    }

    Ok(updated)
}

/// Mark a statement paid, flag its charges paid and accrue loyalty points.
async fn settle_statement(
    conn: &mut PgConnection,
    statement: Statement,
) -> Result<Statement, AppError> {
    let settled = sqlx::query_as::<_, Statement>(
        r#"
        UPDATE statements
        SET status = 'paid', paid_utc = NOW(), updated_utc = NOW()
        WHERE statement_id = $1
        RETURNING statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
        "#,
    )
    .bind(statement.statement_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to settle statement: {}", e)))?;

    let flagged = sqlx::query(
        r#"
        UPDATE charges
        SET is_paid = TRUE, updated_utc = NOW()
        WHERE statement_id = $1 AND is_paid = FALSE
        "#,
    )
    .bind(statement.statement_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to flag charges paid: {}", e)))?;

    let points = loyalty::accrue_statement_points(conn, &settled).await?;

    info!(
        statement_id = %settled.statement_id,
        total = %settled.total,
        charges = flagged.rows_affected(),
        points = points,
        "Statement settled"
    );

    Ok(settled)
}

/// Load a statement without locking it.
pub(super) async fn fetch_statement(
    conn: &mut PgConnection,
    statement_id: Uuid,
) -> Result<Statement, AppError> {
    sqlx::query_as::<_, Statement>(
        r#"
        SELECT statement_id, card_id, reference_month, closing_date, due_date, total, amount_paid, status, paid_utc, created_utc, updated_utc
        FROM statements
        WHERE statement_id = $1
        "#,
    )
    .bind(statement_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get statement: {}", e)))
}
