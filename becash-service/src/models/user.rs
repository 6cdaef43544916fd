//! User profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Profile of an authenticated user, maintained by the frontend on login.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub phone_verified_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating or refreshing a profile.
#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}
