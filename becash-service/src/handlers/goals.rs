//! Savings goals, contributions and sharing.
//!
//! Goals are visible to their owner and collaborators only; anyone else gets a 404 so goal ids
//! do not leak. Management operations are owner-only.

use crate::handlers::{nullable, require_feature, require_profile};
use crate::middleware::UserId;
use crate::models::{
    Collaborator, Contribution, CreateGoal, Feature, Goal, GoalAccess, GoalDetail, GoalInvite,
    NewContribution, NewInvite, Permission, UpdateGoal,
};
use crate::money::{non_zero_amount, positive_amount};
use crate::services::record_goal_contribution;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

const INVITE_TOKEN_LENGTH: usize = 32;
const RECENT_CONTRIBUTIONS: i64 = 10;
const MAX_CONTRIBUTIONS_PAGE: i64 = 200;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGoalRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    pub target_amount: Decimal,
    pub deadline: Option<NaiveDate>,
    #[validate(url(message = "Cover image must be a valid URL"))]
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGoalRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: Option<String>,
    pub target_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub cover_image_url: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContributeRequest {
    pub amount: Decimal,
    #[validate(length(max = 200, message = "Note must be at most 200 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContributeResponse {
    pub goal: Goal,
    pub contribution: Contribution,
}

#[derive(Debug, Deserialize)]
pub struct ContributionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateInviteRequest {
    pub permission: Option<Permission>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollaboratorRequest {
    pub permission: Permission,
}

fn generate_invite_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

async fn goal_access(state: &AppState, user_id: Uuid, goal_id: Uuid) -> Result<GoalAccess, AppError> {
    state
        .db
        .get_goal_access(user_id, goal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Goal not found")))
}

fn require_owner(access: &GoalAccess) -> Result<(), AppError> {
    if access.role().can_manage() {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the goal owner can do this"
        )))
    }
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn create_goal(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateGoalRequest>,
) -> Result<(StatusCode, Json<Goal>), AppError> {
    request.validate()?;
    let target_amount = positive_amount(request.target_amount, "target_amount")?;

    require_profile(&state, user_id).await?;

    let goal = state
        .db
        .create_goal(&CreateGoal {
            owner_id: user_id,
            name: request.name.trim().to_string(),
            target_amount,
            deadline: request.deadline,
            cover_image_url: request.cover_image_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(goal)))
}

/// Goals the caller owns or collaborates on, with the caller's role.
pub async fn list_goals(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<GoalAccess>>, AppError> {
    Ok(Json(state.db.list_goals(user_id).await?))
}

pub async fn get_goal(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
) -> Result<Json<GoalDetail>, AppError> {
    let access = goal_access(&state, user_id, goal_id).await?;
    let collaborators = state.db.list_collaborators(goal_id).await?;
    let recent_contributions = state
        .db
        .list_contributions(goal_id, RECENT_CONTRIBUTIONS)
        .await?;

    Ok(Json(GoalDetail {
        remaining: access.goal.remaining(),
        goal: access,
        collaborators,
        recent_contributions,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id))]
pub async fn update_goal(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
    Json(request): Json<UpdateGoalRequest>,
) -> Result<Json<Goal>, AppError> {
    request.validate()?;
    let access = goal_access(&state, user_id, goal_id).await?;
    require_owner(&access)?;

    let target_amount = request
        .target_amount
        .map(|target| positive_amount(target, "target_amount"))
        .transpose()?;
    if let Some(target) = target_amount {
        if target < access.goal.current_amount {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "target_amount cannot be below the saved amount {}",
                access.goal.current_amount
            )));
        }
    }

    let goal = state
        .db
        .update_goal(
            goal_id,
            &UpdateGoal {
                name: request.name.map(|n| n.trim().to_string()),
                target_amount,
                deadline: request.deadline,
                cover_image_url: request.cover_image_url,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Goal not found")))?;

    Ok(Json(goal))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id))]
pub async fn delete_goal(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let access = goal_access(&state, user_id, goal_id).await?;
    require_owner(&access)?;

    if state.db.delete_goal(goal_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Goal not found")))
    }
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id))]
pub async fn contribute(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
    Json(request): Json<ContributeRequest>,
) -> Result<(StatusCode, Json<ContributeResponse>), AppError> {
    request.validate()?;
    let amount = non_zero_amount(request.amount, "amount")?;

    let (goal, contribution) = state
        .db
        .contribute(&NewContribution {
            goal_id,
            user_id,
            amount,
            note: request.note,
        })
        .await?;

    record_goal_contribution(amount < Decimal::ZERO);

    Ok((
        StatusCode::CREATED,
        Json(ContributeResponse { goal, contribution }),
    ))
}

pub async fn list_contributions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
    Query(query): Query<ContributionsQuery>,
) -> Result<Json<Vec<Contribution>>, AppError> {
    goal_access(&state, user_id, goal_id).await?;
    let limit = query
        .limit
        .unwrap_or(50)
        .clamp(1, MAX_CONTRIBUTIONS_PAGE);

    Ok(Json(state.db.list_contributions(goal_id, limit).await?))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id))]
pub async fn create_invite(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(goal_id): Path<Uuid>,
    request: Option<Json<CreateInviteRequest>>,
) -> Result<(StatusCode, Json<GoalInvite>), AppError> {
    let access = goal_access(&state, user_id, goal_id).await?;
    require_owner(&access)?;
    require_feature(&state, user_id, Feature::SharedGoals).await?;

    let permission = request
        .and_then(|Json(r)| r.permission)
        .unwrap_or(Permission::Read);

    let invite = state
        .db
        .create_invite(&NewInvite::new(
            goal_id,
            user_id,
            permission,
            generate_invite_token(),
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(invite)))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn accept_invite(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(token): Path<String>,
) -> Result<Json<GoalAccess>, AppError> {
    require_profile(&state, user_id).await?;
    Ok(Json(state.db.accept_invite(user_id, token.trim()).await?))
}

#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id, collaborator_id = %collaborator_id))]
pub async fn update_collaborator(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((goal_id, collaborator_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateCollaboratorRequest>,
) -> Result<Json<Collaborator>, AppError> {
    let access = goal_access(&state, user_id, goal_id).await?;
    require_owner(&access)?;

    let collaborator = state
        .db
        .update_collaborator(goal_id, collaborator_id, request.permission)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Collaborator not found")))?;

    Ok(Json(collaborator))
}

/// Remove a collaborator. The owner may remove anyone; a collaborator may remove themselves.
#[tracing::instrument(skip_all, fields(user_id = %user_id, goal_id = %goal_id, collaborator_id = %collaborator_id))]
pub async fn remove_collaborator(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((goal_id, collaborator_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let access = goal_access(&state, user_id, goal_id).await?;
    if collaborator_id != user_id {
        require_owner(&access)?;
    }

    if state.db.remove_collaborator(goal_id, collaborator_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Collaborator not found")))
    }
}
