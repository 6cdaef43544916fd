//! Savings goal (meta) model: contributions, collaborators and invites.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// How long an invite link stays valid.
pub const INVITE_TTL_DAYS: i64 = 7;

/// Collaborator permission on a shared goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "write" => Permission::Write,
            _ => Permission::Read,
        }
    }
}

/// The caller's relationship to a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalRole {
    Owner,
    Write,
    Read,
}

impl GoalRole {
    pub fn from_string(s: &str) -> Self {
        match s {
            "owner" => GoalRole::Owner,
            "write" => GoalRole::Write,
            _ => GoalRole::Read,
        }
    }

    pub fn can_contribute(&self) -> bool {
        matches!(self, GoalRole::Owner | GoalRole::Write)
    }

    pub fn can_manage(&self) -> bool {
        *self == GoalRole::Owner
    }
}

/// Savings goal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Goal {
    pub goal_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub deadline: Option<NaiveDate>,
    pub cover_image_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Goal {
    pub fn remaining(&self) -> Decimal {
        (self.target_amount - self.current_amount).max(Decimal::ZERO)
    }
}

/// Goal as seen by a particular user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoalAccess {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub goal: Goal,
    pub role: String,
}

impl GoalAccess {
    pub fn role(&self) -> GoalRole {
        GoalRole::from_string(&self.role)
    }
}

/// Input for creating a goal.
#[derive(Debug, Clone)]
pub struct CreateGoal {
    pub owner_id: Uuid,
    pub name: String,
    pub target_amount: Decimal,
    pub deadline: Option<NaiveDate>,
    pub cover_image_url: Option<String>,
}

/// Partial goal update.
#[derive(Debug, Clone, Default)]
pub struct UpdateGoal {
    pub name: Option<String>,
    pub target_amount: Option<Decimal>,
    pub deadline: Option<Option<NaiveDate>>,
    pub cover_image_url: Option<Option<String>>,
}

/// Append-only contribution ledger entry. Negative amounts are withdrawals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contribution {
    pub contribution_id: Uuid,
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for contributing to a goal.
#[derive(Debug, Clone)]
pub struct NewContribution {
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub note: Option<String>,
}

/// Validate a contribution and return the goal's new current amount.
///
/// Deposits may not push the goal past its target; withdrawals may not take it below zero.
pub fn apply_contribution(
    current: Decimal,
    target: Decimal,
    amount: Decimal,
) -> Result<Decimal, AppError> {
    if amount.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Contribution amount must not be zero"
        )));
    }

    let next = current + amount;
    if amount > Decimal::ZERO && next > target {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Contribution of {} exceeds the remaining {} for this goal",
            amount,
            (target - current).max(Decimal::ZERO)
        )));
    }
    if next < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Withdrawal of {} exceeds the saved amount {}",
            -amount,
            current
        )));
    }

    Ok(next)
}

/// Collaborator on a goal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collaborator {
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub permission: String,
    pub added_utc: DateTime<Utc>,
}

/// Invite link for sharing a goal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoalInvite {
    pub invite_id: Uuid,
    pub goal_id: Uuid,
    pub token: String,
    pub permission: String,
    pub created_by: Uuid,
    pub expires_utc: DateTime<Utc>,
    pub accepted_by: Option<Uuid>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Invite lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    Pending,
    Accepted,
    Expired,
}

impl GoalInvite {
    pub fn state(&self, now: DateTime<Utc>) -> InviteState {
        if self.accepted_utc.is_some() {
            InviteState::Accepted
        } else if now >= self.expires_utc {
            InviteState::Expired
        } else {
            InviteState::Pending
        }
    }

    /// Check whether `user_id` may accept this invite for a goal owned by `owner_id`.
    pub fn check_acceptable(
        &self,
        user_id: Uuid,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.state(now) {
            InviteState::Accepted => Err(AppError::Conflict(anyhow::anyhow!(
                "Invite has already been used"
            ))),
            InviteState::Expired => Err(AppError::Gone(anyhow::anyhow!("Invite has expired"))),
            InviteState::Pending if user_id == owner_id => Err(AppError::BadRequest(
                anyhow::anyhow!("Goal owner cannot accept their own invite"),
            )),
            InviteState::Pending => Ok(()),
        }
    }
}

/// Input for creating an invite.
#[derive(Debug, Clone)]
pub struct NewInvite {
    pub goal_id: Uuid,
    pub created_by: Uuid,
    pub permission: Permission,
    pub token: String,
    pub expires_utc: DateTime<Utc>,
}

impl NewInvite {
    pub fn new(goal_id: Uuid, created_by: Uuid, permission: Permission, token: String) -> Self {
        Self {
            goal_id,
            created_by,
            permission,
            token,
            expires_utc: Utc::now() + Duration::days(INVITE_TTL_DAYS),
        }
    }
}

/// Goal with collaborators and recent contributions.
#[derive(Debug, Clone, Serialize)]
pub struct GoalDetail {
    #[serde(flatten)]
    pub goal: GoalAccess,
    pub remaining: Decimal,
    pub collaborators: Vec<Collaborator>,
    pub recent_contributions: Vec<Contribution>,
}
