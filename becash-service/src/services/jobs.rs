//! Scheduled jobs: recurring entry replication and statement closing.
//!
//! Both are single synchronous passes triggered over HTTP by an external scheduler. Rerunning
//! either for the same month changes nothing.

use crate::calendar::ReferenceMonth;
use crate::services::database::{Database, ReplicationOutcome};
use crate::services::metrics::record_charge_created;
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecurrenceReport {
    pub month: ReferenceMonth,
    pub scanned: u64,
    pub created: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CloseReport {
    pub closed_month: ReferenceMonth,
    pub closed: u64,
    pub ensured: u64,
}

/// Create this month's instance of every active recurring entry.
#[instrument(skip(db), fields(month = %month))]
pub async fn replicate_recurrences(
    db: &Database,
    month: ReferenceMonth,
) -> Result<RecurrenceReport, AppError> {
    let roots = db.list_recurring_roots(month).await?;

    let mut report = RecurrenceReport {
        month,
        scanned: 0,
        created: 0,
        skipped: 0,
    };

    for root in roots.iter().filter(|root| root.recurs_in(month)) {
        report.scanned += 1;
        match db.replicate_recurrence(root, month).await? {
            ReplicationOutcome::Created(instance) => {
                report.created += 1;
                record_charge_created(&instance.kind, "recurrence");
            }
            ReplicationOutcome::AlreadyExists | ReplicationOutcome::StatementPaid => {
                report.skipped += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        created = report.created,
        skipped = report.skipped,
        "Recurring entries replicated"
    );

    Ok(report)
}

/// Close last month's open statements and make sure every card has a statement for `month`.
#[instrument(skip(db), fields(month = %month))]
pub async fn close_statements(db: &Database, month: ReferenceMonth) -> Result<CloseReport, AppError> {
    let closed_month = month.previous();
    let closed = db.close_open_statements(closed_month).await?;

    let mut ensured = 0;
    for card in db.list_all_cards().await? {
        db.ensure_statement(&card, month).await?;
        ensured += 1;
    }

    info!(
        closed_month = %closed_month,
        closed = closed,
        ensured = ensured,
        "Statements closed"
    );

    Ok(CloseReport {
        closed_month,
        closed,
        ensured,
    })
}
