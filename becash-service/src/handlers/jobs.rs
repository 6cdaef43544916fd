use crate::handlers::month_or_current;
use crate::middleware::CronAuth;
use crate::services::{
    close_statements as run_close_statements, record_job_run,
    replicate_recurrences as run_replicate_recurrences, CloseReport, RecurrenceReport,
};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    /// `YYYY-MM`; defaults to the current UTC month so a missed run can be replayed.
    pub month: Option<String>,
}

pub async fn replicate_recurrences(
    _auth: CronAuth,
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<RecurrenceReport>, AppError> {
    let month = month_or_current(query.month.as_deref())?;

    match run_replicate_recurrences(&state.db, month).await {
        Ok(report) => {
            record_job_run("recurrences", "success");
            Ok(Json(report))
        }
        Err(e) => {
            tracing::error!(error = %e, month = %month, "Recurrence job failed");
            record_job_run("recurrences", "failure");
            Err(e)
        }
    }
}

pub async fn close_statements(
    _auth: CronAuth,
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<CloseReport>, AppError> {
    let month = month_or_current(query.month.as_deref())?;

    match run_close_statements(&state.db, month).await {
        Ok(report) => {
            record_job_run("close_statements", "success");
            Ok(Json(report))
        }
        Err(e) => {
            tracing::error!(error = %e, month = %month, "Statement close job failed");
            record_job_run("close_statements", "failure");
            Err(e)
        }
    }
}
