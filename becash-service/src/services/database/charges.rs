use super::cards::fetch_card;
use super::statements::{fetch_statement, recompute_total, resolve_statement};
use super::{commit, Database};
use crate::calendar::ReferenceMonth;
use crate::models::{
    Charge, ChargeKind, ListChargesFilter, MonthlySummary, NewCharge, Statement, UpdateCharge,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of generating one recurring instance.
#[derive(Debug)]
pub enum ReplicationOutcome {
    Created(Charge),
    AlreadyExists,
    StatementPaid,
}

impl Database {
    // =========================================================================
    // Charge Operations
    // =========================================================================

    /// Create an entry. Card expenses are attached to the statement the purchase falls in.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, kind = input.kind.as_str()))]
    pub async fn create_charge(&self, input: &NewCharge) -> Result<Charge, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_charge"])
            .start_timer();

        let mut tx = self.begin().await?;

        let statement = match input.card_id {
            Some(card_id) => Some(attach_to_statement(&mut tx, input.user_id, card_id, input).await?),
            None => None,
        };
        let statement_id = statement.as_ref().map(|s| s.statement_id);

        let charge = insert_charge(&mut tx, input, statement_id)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!("Entry already exists for that month"))
            })?;

        if let Some(statement_id) = statement_id {
            recompute_total(&mut tx, statement_id).await?;
        }

        commit(tx).await?;
        timer.observe_duration();
        info!(charge_id = %charge.charge_id, statement_id = ?statement_id, "Charge created");

        Ok(charge)
    }

    /// Get an entry owned by `user_id`.
    #[instrument(skip(self), fields(user_id = %user_id, charge_id = %charge_id))]
    pub async fn get_charge(
        &self,
        user_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_charge"])
            .start_timer();

        let charge = sqlx::query_as::<_, Charge>(
            r#"
            SELECT charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
            FROM charges
            WHERE user_id = $1 AND charge_id = $2
            "#,
        )
        .bind(user_id)
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get charge: {}", e)))?;

        timer.observe_duration();

        Ok(charge)
    }

    /// List a user's entries.
    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    pub async fn list_charges(
        &self,
        user_id: Uuid,
        filter: &ListChargesFilter,
    ) -> Result<Vec<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_charges"])
            .start_timer();

        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
            FROM charges
            WHERE user_id = $1
              AND ($2::text IS NULL OR occurrence_month = $2)
              AND ($3::text IS NULL OR kind = $3)
              AND ($4::uuid IS NULL OR card_id = $4)
              AND ($5::bool IS NULL OR is_paid = $5)
            ORDER BY occurred_on DESC, created_utc DESC
            "#,
        )
        .bind(user_id)
        .bind(filter.month.map(|m| m.to_string()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.card_id)
        .bind(filter.is_paid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list charges: {}", e)))?;

        timer.observe_duration();

        Ok(charges)
    }

    /// Update an entry, moving it between statements when its card or date changes.
    #[instrument(skip(self, input), fields(user_id = %user_id, charge_id = %charge_id))]
    pub async fn update_charge(
        &self,
        user_id: Uuid,
        charge_id: Uuid,
        input: &UpdateCharge,
    ) -> Result<Option<Charge>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_charge"])
            .start_timer();

        let mut tx = self.begin().await?;

        let Some(current) = lock_charge(&mut tx, user_id, charge_id).await? else {
            return Ok(None);
        };
        if let Some(statement_id) = current.statement_id {
            ensure_unpaid(&fetch_statement(&mut tx, statement_id).await?)?;
        }

        let card_id = input.card_id.unwrap_or(current.card_id);
        let occurred_on = input.occurred_on.unwrap_or(current.occurred_on);
        let recurrence_end = input.recurrence_end.unwrap_or(current.recurrence_end);
        if let Some(end) = recurrence_end {
            if !current.is_recurring {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "recurrence_end requires a recurring entry"
                )));
            }
            if end < occurred_on {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "recurrence_end must not precede occurred_on"
                )));
            }
        }

        let next = NewCharge {
            user_id,
            description: input
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
            amount: input.amount.unwrap_or(current.amount),
            kind: current.kind(),
            category: input
                .category
                .clone()
                .unwrap_or_else(|| current.category.clone()),
            occurred_on,
            is_paid: input.is_paid.unwrap_or(current.is_paid),
            card_id,
            is_recurring: current.is_recurring,
            recurrence_end,
            parent_id: current.parent_id,
        };

        let new_statement_id = match card_id {
            Some(card_id) => {
                if input.is_paid.is_some() {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Card entries are settled by paying their statement"
                    )));
                }
                Some(
                    attach_to_statement(&mut tx, user_id, card_id, &next)
                        .await?
                        .statement_id,
                )
            }
            None => None,
        };
        // Entries on a statement are only paid through it.
        let is_paid = new_statement_id.is_none() && next.is_paid;

        let updated = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET description = $3,
                amount = $4,
                category = $5,
                occurred_on = $6,
                occurrence_month = $7,
                is_paid = $8,
                card_id = $9,
                statement_id = $10,
                recurrence_end = $11,
                updated_utc = NOW()
            WHERE user_id = $1 AND charge_id = $2
            RETURNING charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(charge_id)
        .bind(&next.description)
        .bind(next.amount)
        .bind(&next.category)
        .bind(next.occurred_on)
        .bind(next.occurrence_month().to_string())
        .bind(is_paid)
        .bind(next.card_id)
        .bind(new_statement_id)
        .bind(next.recurrence_end)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_instance_conflict)?;

        if let Some(old) = current.statement_id.filter(|id| Some(*id) != new_statement_id) {
            recompute_total(&mut tx, old).await?;
        }
        if let Some(new) = new_statement_id {
            recompute_total(&mut tx, new).await?;
        }

        commit(tx).await?;
        timer.observe_duration();

        Ok(Some(updated))
    }

    /// Delete an entry and refresh the statement it was on.
    #[instrument(skip(self), fields(user_id = %user_id, charge_id = %charge_id))]
    pub async fn delete_charge(&self, user_id: Uuid, charge_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_charge"])
            .start_timer();

        let mut tx = self.begin().await?;

        let Some(current) = lock_charge(&mut tx, user_id, charge_id).await? else {
            return Ok(false);
        };
        if let Some(statement_id) = current.statement_id {
            ensure_unpaid(&fetch_statement(&mut tx, statement_id).await?)?;
        }

        sqlx::query("DELETE FROM charges WHERE user_id = $1 AND charge_id = $2")
            .bind(user_id)
            .bind(charge_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete charge: {}", e)))?;

        if let Some(statement_id) = current.statement_id {
            recompute_total(&mut tx, statement_id).await?;
        }

        commit(tx).await?;
        timer.observe_duration();
        info!("Charge deleted");

        Ok(true)
    }

    /// Income, expense and balance of a user's month.
    #[instrument(skip(self), fields(user_id = %user_id, month = %month))]
    pub async fn monthly_summary(
        &self,
        user_id: Uuid,
        month: ReferenceMonth,
    ) -> Result<MonthlySummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["monthly_summary"])
            .start_timer();

        let summary = sqlx::query_as::<_, MonthlySummary>(
            r#"
            SELECT $2::text AS month,
                   COALESCE(SUM(amount) FILTER (WHERE kind = 'income'), 0) AS income,
                   COALESCE(SUM(amount) FILTER (WHERE kind = 'expense'), 0) AS expense,
                   COALESCE(SUM(CASE WHEN kind = 'income' THEN amount ELSE -amount END), 0) AS balance,
                   COALESCE(SUM(amount) FILTER (WHERE kind = 'expense' AND is_paid = FALSE), 0) AS unpaid_expense,
                   COUNT(*) AS entries
            FROM charges
            WHERE user_id = $1 AND occurrence_month = $2
            "#,
        )
        .bind(user_id)
        .bind(month.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to summarize month: {}", e)))?;

        timer.observe_duration();

        Ok(summary)
    }

    /// Insert the `month` instance of a recurring root unless it already exists.
    #[instrument(skip(self, root), fields(parent_id = %root.charge_id, month = %month))]
    pub async fn replicate_recurrence(
        &self,
        root: &Charge,
        month: ReferenceMonth,
    ) -> Result<ReplicationOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replicate_recurrence"])
            .start_timer();

        let instance = root.instance_for(month);
        let mut tx = self.begin().await?;

        let mut statement_id = None;
        if let Some(card_id) = instance.card_id {
            if let Some(card) = fetch_card(&mut tx, instance.user_id, card_id).await? {
                let statement =
                    resolve_statement(&mut tx, &card, card.statement_month_for(instance.occurred_on))
                        .await?;
                if statement.is_paid() {
                    warn!(
                        statement_id = %statement.statement_id,
                        "Target statement already paid, skipping recurring instance"
                    );
                    return Ok(ReplicationOutcome::StatementPaid);
                }
                statement_id = Some(statement.statement_id);
            }
        }

        let Some(charge) = insert_charge(&mut tx, &instance, statement_id).await? else {
            return Ok(ReplicationOutcome::AlreadyExists);
        };
        if let Some(statement_id) = statement_id {
            recompute_total(&mut tx, statement_id).await?;
        }

        commit(tx).await?;
        timer.observe_duration();

        Ok(ReplicationOutcome::Created(charge))
    }
}

/// Resolve and validate the statement a card expense lands on.
async fn attach_to_statement(
    conn: &mut PgConnection,
    user_id: Uuid,
    card_id: Uuid,
    input: &NewCharge,
) -> Result<Statement, AppError> {
    if input.kind == ChargeKind::Income {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Income entries cannot be charged to a card"
        )));
    }
    let card = fetch_card(&mut *conn, user_id, card_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Card not found")))?;
    let statement = resolve_statement(conn, &card, card.statement_month_for(input.occurred_on)).await?;
    ensure_unpaid(&statement)?;
    Ok(statement)
}

fn ensure_unpaid(statement: &Statement) -> Result<(), AppError> {
    if statement.is_paid() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Statement {} is already paid",
            statement.reference_month
        )));
    }
    Ok(())
}

async fn lock_charge(
    conn: &mut PgConnection,
    user_id: Uuid,
    charge_id: Uuid,
) -> Result<Option<Charge>, AppError> {
    sqlx::query_as::<_, Charge>(
        r#"
        SELECT charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
        FROM charges
        WHERE user_id = $1 AND charge_id = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(charge_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock charge: {}", e)))
}

/// Insert an entry. Returns `None` when the recurring instance for that month already exists.
async fn insert_charge(
    conn: &mut PgConnection,
    input: &NewCharge,
    statement_id: Option<Uuid>,
) -> Result<Option<Charge>, AppError> {
    sqlx::query_as::<_, Charge>(
        r#"
        INSERT INTO charges (charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (parent_id, occurrence_month) WHERE parent_id IS NOT NULL DO NOTHING
        RETURNING charge_id, user_id, description, amount, kind, category, occurred_on, occurrence_month, is_paid, card_id, statement_id, is_recurring, recurrence_end, parent_id, created_utc, updated_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(&input.description)
    .bind(input.amount)
    .bind(input.kind.as_str())
    .bind(&input.category)
    .bind(input.occurred_on)
    .bind(input.occurrence_month().to_string())
    .bind(input.is_paid && statement_id.is_none())
    .bind(input.card_id)
    .bind(statement_id)
    .bind(input.is_recurring)
    .bind(input.recurrence_end)
    .bind(input.parent_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert charge: {}", e)))
}

fn map_instance_conflict(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::Conflict(
            anyhow::anyhow!("A recurring instance already exists for that month"),
        ),
        e => AppError::DatabaseError(anyhow::anyhow!("Failed to update charge: {}", e)),
    }
}
