//! Services module for becash-service.

pub mod database;
pub mod jobs;
pub mod metrics;
pub mod verification;

pub use database::{Database, ReplicationOutcome};
pub use jobs::{close_statements, replicate_recurrences, CloseReport, RecurrenceReport};
pub use metrics::{
    get_metrics, init_metrics, record_charge_created, record_goal_contribution, record_job_run,
    record_statement_payment, record_verification,
};
pub use verification::{
    CodeDelivery, InMemoryVerificationStore, LogDelivery, RecordingDelivery,
    RedisVerificationStore, SentCode, VerificationService, VerificationStore,
};
