use super::{commit, Database};
use crate::models::{accrual_points, NewPointsEntry, PointsEntry, PointsReason, Statement};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    // =========================================================================
    // Loyalty Points Operations
    // =========================================================================

    /// Current points balance of a card.
    #[instrument(skip(self), fields(card_id = %card_id))]
    pub async fn points_balance(&self, card_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["points_balance"])
            .start_timer();

        let mut conn = super::acquire(&self.pool).await?;
        let balance = balance(&mut conn, card_id).await?;

        timer.observe_duration();

        Ok(balance)
    }

    /// Points ledger of a card, newest first.
    #[instrument(skip(self), fields(card_id = %card_id))]
    pub async fn list_points_entries(&self, card_id: Uuid) -> Result<Vec<PointsEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_points_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, PointsEntry>(
            r#"
            SELECT entry_id, card_id, statement_id, points, reason, description, created_utc
            FROM points_entries
            WHERE card_id = $1
            ORDER BY created_utc DESC, entry_id
            "#,
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list points: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Redeem points from a card. The card row is locked so concurrent redemptions serialize.
    #[instrument(skip(self, description), fields(card_id = %card_id, points = points))]
    pub async fn redeem_points(
        &self,
        card_id: Uuid,
        points: i64,
        description: Option<String>,
    ) -> Result<(PointsEntry, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["redeem_points"])
            .start_timer();

        if points <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Points to redeem must be greater than zero"
            )));
        }

        let mut tx = self.begin().await?;
        lock_card(&mut tx, card_id).await?;

        let available = balance(&mut tx, card_id).await?;
        if points > available {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot redeem {} points, balance is {}",
                points,
                available
            )));
        }

        let entry = insert_points_entry(
            &mut tx,
            &NewPointsEntry {
                card_id,
                statement_id: None,
                points: -points,
                reason: PointsReason::Redemption,
                description,
            },
        )
        .await?;

        commit(tx).await?;
        timer.observe_duration();
        info!(entry_id = %entry.entry_id, "Points redeemed");

        Ok((entry, available - points))
    }

    /// Manually adjust a card's points. Negative adjustments may not overdraw the balance.
    #[instrument(skip(self, description), fields(card_id = %card_id, points = points))]
    pub async fn adjust_points(
        &self,
        card_id: Uuid,
        points: i64,
        description: Option<String>,
    ) -> Result<(PointsEntry, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["adjust_points"])
            .start_timer();

        if points == 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Adjustment must not be zero"
            )));
        }

        let mut tx = self.begin().await?;
        lock_card(&mut tx, card_id).await?;

        let current = balance(&mut tx, card_id).await?;
        if current + points < 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Adjustment of {} would leave a negative balance ({} available)",
                points,
                current
            )));
        }

        let entry = insert_points_entry(
            &mut tx,
            &NewPointsEntry {
                card_id,
                statement_id: None,
                points,
                reason: PointsReason::Adjustment,
                description,
            },
        )
        .await?;

        commit(tx).await?;
        timer.observe_duration();
        info!(entry_id = %entry.entry_id, "Points adjusted");

        Ok((entry, current + points))
    }
}

async fn lock_card(conn: &mut PgConnection, card_id: Uuid) -> Result<(), AppError> {
    sqlx::query("SELECT card_id FROM cards WHERE card_id = $1 FOR UPDATE")
        .bind(card_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock card: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))?;
    Ok(())
}

async fn balance(conn: &mut PgConnection, card_id: Uuid) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(points), 0)::BIGINT FROM points_entries WHERE card_id = $1",
    )
    .bind(card_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute balance: {}", e)))
}

async fn insert_points_entry(
    conn: &mut PgConnection,
    input: &NewPointsEntry,
) -> Result<PointsEntry, AppError> {
    sqlx::query_as::<_, PointsEntry>(
        r#"
        INSERT INTO points_entries (entry_id, card_id, statement_id, points, reason, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING entry_id, card_id, statement_id, points, reason, description, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.card_id)
    .bind(input.statement_id)
    .bind(input.points)
    .bind(input.reason.as_str())
    .bind(&input.description)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert points entry: {}", e)))
}

/// Credit `floor(total * rate)` points for a settled statement, at most once per statement.
/// Returns the points credited.
pub(super) async fn accrue_statement_points(
    conn: &mut PgConnection,
    statement: &Statement,
) -> Result<i64, AppError> {
    let rate = sqlx::query_scalar::<_, Decimal>("SELECT points_rate FROM cards WHERE card_id = $1")
        .bind(statement.card_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load points rate: {}", e)))?;

    let points = accrual_points(statement.total, rate);
    if points == 0 {
        return Ok(0);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO points_entries (entry_id, card_id, statement_id, points, reason, description)
        VALUES ($1, $2, $3, $4, 'accrual', $5)
        ON CONFLICT (statement_id) WHERE reason = 'accrual' DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(statement.card_id)
    .bind(statement.statement_id)
    .bind(points)
    .bind(format!("Statement {}", statement.reference_month))
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to accrue points: {}", e)))?;

    Ok(if inserted.rows_affected() > 0 { points } else { 0 })
}
