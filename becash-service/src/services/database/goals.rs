use super::{commit, Database};
use crate::models::{
    apply_contribution, Collaborator, Contribution, CreateGoal, Goal, GoalAccess, GoalInvite,
    NewContribution, NewInvite, Permission, UpdateGoal,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

/// Goals visible to `$2` (owned or shared), with the caller's role.
const GOAL_ACCESS_QUERY: &str = r#"
    SELECT g.goal_id, g.owner_id, g.name, g.target_amount, g.current_amount, g.deadline, g.cover_image_url, g.created_utc, g.updated_utc,
           CASE WHEN g.owner_id = $2 THEN 'owner' ELSE gc.permission END AS role
    FROM goals g
    LEFT JOIN goal_collaborators gc ON gc.goal_id = g.goal_id AND gc.user_id = $2
    WHERE ($1::uuid IS NULL OR g.goal_id = $1)
      AND (g.owner_id = $2 OR gc.user_id IS NOT NULL)
"#;

impl Database {
    // =========================================================================
    // Goal Operations
    // =========================================================================

    /// Create a goal.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create_goal(&self, input: &CreateGoal) -> Result<Goal, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_goal"])
            .start_timer();

        let goal = sqlx::query_as::<_, Goal>(
            r#"
            INSERT INTO goals (goal_id, owner_id, name, target_amount, deadline, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING goal_id, owner_id, name, target_amount, current_amount, deadline, cover_image_url, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(input.target_amount)
        .bind(input.deadline)
        .bind(&input.cover_image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create goal: {}", e)))?;

        timer.observe_duration();
        info!(goal_id = %goal.goal_id, "Goal created");

        Ok(goal)
    }

    /// Get a goal the user owns or collaborates on.
    #[instrument(skip(self), fields(user_id = %user_id, goal_id = %goal_id))]
    pub async fn get_goal_access(
        &self,
        user_id: Uuid,
        goal_id: Uuid,
    ) -> Result<Option<GoalAccess>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_goal_access"])
            .start_timer();

        let mut conn = super::acquire(&self.pool).await?;
        let access = fetch_access(&mut conn, user_id, goal_id, false).await?;

        timer.observe_duration();

        Ok(access)
    }

    /// List goals the user owns or collaborates on.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_goals(&self, user_id: Uuid) -> Result<Vec<GoalAccess>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_goals"])
            .start_timer();

        let sql = format!("{GOAL_ACCESS_QUERY} ORDER BY g.created_utc, g.goal_id");
        let goals = sqlx::query_as::<_, GoalAccess>(&sql)
            .bind(None::<Uuid>)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list goals: {}", e)))?;

        timer.observe_duration();

        Ok(goals)
    }

    /// Update a goal's details.
    #[instrument(skip(self, input), fields(goal_id = %goal_id))]
    pub async fn update_goal(
        &self,
        goal_id: Uuid,
        input: &UpdateGoal,
    ) -> Result<Option<Goal>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_goal"])
            .start_timer();

        let goal = sqlx::query_as::<_, Goal>(
            r#"
            UPDATE goals
            SET name = COALESCE($2, name),
                target_amount = COALESCE($3, target_amount),
                deadline = CASE WHEN $4 THEN $5 ELSE deadline END,
                cover_image_url = CASE WHEN $6 THEN $7 ELSE cover_image_url END,
                updated_utc = NOW()
            WHERE goal_id = $1
            RETURNING goal_id, owner_id, name, target_amount, current_amount, deadline, cover_image_url, created_utc, updated_utc
            "#,
        )
        .bind(goal_id)
        .bind(&input.name)
        .bind(input.target_amount)
        .bind(input.deadline.is_some())
        .bind(input.deadline.flatten())
        .bind(input.cover_image_url.is_some())
        .bind(input.cover_image_url.clone().flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update goal: {}", e)))?;

        timer.observe_duration();

        Ok(goal)
    }

    /// Delete a goal with its contributions, collaborators and invites.
    #[instrument(skip(self), fields(goal_id = %goal_id))]
    pub async fn delete_goal(&self, goal_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_goal"])
            .start_timer();

        let result = sqlx::query("DELETE FROM goals WHERE goal_id = $1")
            .bind(goal_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete goal: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Contribution Operations
    // =========================================================================

    /// Record a deposit or withdrawal with the goal row locked.
    #[instrument(skip(self, input), fields(goal_id = %input.goal_id, user_id = %input.user_id))]
    pub async fn contribute(
        &self,
        input: &NewContribution,
    ) -> Result<(Goal, Contribution), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["contribute"])
            .start_timer();

        let mut tx = self.begin().await?;

        let access = fetch_access(&mut tx, input.user_id, input.goal_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Goal not found")))?;
        if !access.role().can_contribute() {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Read-only collaborators cannot contribute"
            )));
        }

        let current_amount = apply_contribution(
            access.goal.current_amount,
            access.goal.target_amount,
            input.amount,
        )?;

        let contribution = sqlx::query_as::<_, Contribution>(
            r#"
            INSERT INTO goal_contributions (contribution_id, goal_id, user_id, amount, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING contribution_id, goal_id, user_id, amount, note, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.goal_id)
        .bind(input.user_id)
        .bind(input.amount)
        .bind(&input.note)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record contribution: {}", e))
        })?;

        let goal = sqlx::query_as::<_, Goal>(
            r#"
            UPDATE goals
            SET current_amount = $2, updated_utc = NOW()
            WHERE goal_id = $1
            RETURNING goal_id, owner_id, name, target_amount, current_amount, deadline, cover_image_url, created_utc, updated_utc
            "#,
        )
        .bind(input.goal_id)
        .bind(current_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update goal: {}", e)))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(
            contribution_id = %contribution.contribution_id,
            amount = %contribution.amount,
            current_amount = %goal.current_amount,
            "Contribution recorded"
        );

        Ok((goal, contribution))
    }

    /// Contributions to a goal, newest first.
    #[instrument(skip(self), fields(goal_id = %goal_id))]
    pub async fn list_contributions(
        &self,
        goal_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Contribution>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_contributions"])
            .start_timer();

        let contributions = sqlx::query_as::<_, Contribution>(
            r#"
            SELECT contribution_id, goal_id, user_id, amount, note, created_utc
            FROM goal_contributions
            WHERE goal_id = $1
            ORDER BY created_utc DESC, contribution_id
            LIMIT $2
            "#,
        )
        .bind(goal_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list contributions: {}", e))
        })?;

        timer.observe_duration();

        Ok(contributions)
    }

    // =========================================================================
    // Sharing Operations
    // =========================================================================

    /// Collaborators of a goal.
    #[instrument(skip(self), fields(goal_id = %goal_id))]
    pub async fn list_collaborators(&self, goal_id: Uuid) -> Result<Vec<Collaborator>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_collaborators"])
            .start_timer();

        let collaborators = sqlx::query_as::<_, Collaborator>(
            r#"
            SELECT gc.goal_id, gc.user_id, u.name, gc.permission, gc.added_utc
            FROM goal_collaborators gc
            JOIN users u ON u.user_id = gc.user_id
            WHERE gc.goal_id = $1
            ORDER BY gc.added_utc
            "#,
        )
        .bind(goal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list collaborators: {}", e))
        })?;

        timer.observe_duration();

        Ok(collaborators)
    }

    /// Store a new invite link.
    #[instrument(skip(self, input), fields(goal_id = %input.goal_id))]
    pub async fn create_invite(&self, input: &NewInvite) -> Result<GoalInvite, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invite"])
            .start_timer();

        let invite = sqlx::query_as::<_, GoalInvite>(
            r#"
            INSERT INTO goal_invites (invite_id, goal_id, token, permission, created_by, expires_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING invite_id, goal_id, token, permission, created_by, expires_utc, accepted_by, accepted_utc, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.goal_id)
        .bind(&input.token)
        .bind(input.permission.as_str())
        .bind(input.created_by)
        .bind(input.expires_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invite: {}", e)))?;

        timer.observe_duration();
        info!(invite_id = %invite.invite_id, "Invite created");

        Ok(invite)
    }

    /// Accept an invite, making the caller a collaborator.
    #[instrument(skip(self, token), fields(user_id = %user_id))]
    pub async fn accept_invite(&self, user_id: Uuid, token: &str) -> Result<GoalAccess, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["accept_invite"])
            .start_timer();

        let mut tx = self.begin().await?;

        let invite = sqlx::query_as::<_, GoalInvite>(
            r#"
            SELECT invite_id, goal_id, token, permission, created_by, expires_utc, accepted_by, accepted_utc, created_utc
            FROM goal_invites
            WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load invite: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invite not found")))?;

        let owner_id = sqlx::query_scalar::<_, Uuid>("SELECT owner_id FROM goals WHERE goal_id = $1")
            .bind(invite.goal_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load goal: {}", e)))?;

        invite.check_acceptable(user_id, owner_id, Utc::now())?;

        sqlx::query(
            r#"
            INSERT INTO goal_collaborators (goal_id, user_id, permission)
            VALUES ($1, $2, $3)
            ON CONFLICT (goal_id, user_id) DO UPDATE SET permission = EXCLUDED.permission
            "#,
        )
        .bind(invite.goal_id)
        .bind(user_id)
        .bind(&invite.permission)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add collaborator: {}", e)))?;

        sqlx::query(
            "UPDATE goal_invites SET accepted_by = $2, accepted_utc = NOW() WHERE invite_id = $1",
        )
        .bind(invite.invite_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark invite used: {}", e)))?;

        let access = fetch_access(&mut tx, user_id, invite.goal_id, false)
            .await?
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Collaborator row missing")))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(goal_id = %invite.goal_id, permission = %invite.permission, "Invite accepted");

        Ok(access)
    }

    /// Change a collaborator's permission.
    #[instrument(skip(self), fields(goal_id = %goal_id, user_id = %user_id))]
    pub async fn update_collaborator(
        &self,
        goal_id: Uuid,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<Option<Collaborator>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_collaborator"])
            .start_timer();

        let collaborator = sqlx::query_as::<_, Collaborator>(
            r#"
            WITH updated AS (
                UPDATE goal_collaborators
                SET permission = $3
                WHERE goal_id = $1 AND user_id = $2
                RETURNING goal_id, user_id, permission, added_utc
            )
            SELECT updated.goal_id, updated.user_id, u.name, updated.permission, updated.added_utc
            FROM updated
            JOIN users u ON u.user_id = updated.user_id
            "#,
        )
        .bind(goal_id)
        .bind(user_id)
        .bind(permission.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update collaborator: {}", e))
        })?;

        timer.observe_duration();

        Ok(collaborator)
    }

    /// Remove a collaborator from a goal.
    #[instrument(skip(self), fields(goal_id = %goal_id, user_id = %user_id))]
    pub async fn remove_collaborator(&self, goal_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_collaborator"])
            .start_timer();

        let result = sqlx::query("DELETE FROM goal_collaborators WHERE goal_id = $1 AND user_id = $2")
            .bind(goal_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to remove collaborator: {}", e))
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }
}

async fn fetch_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    goal_id: Uuid,
    lock: bool,
) -> Result<Option<GoalAccess>, AppError> {
    let sql = if lock {
        format!("{GOAL_ACCESS_QUERY} FOR UPDATE OF g")
    } else {
        GOAL_ACCESS_QUERY.to_string()
    };

    sqlx::query_as::<_, GoalAccess>(&sql)
        .bind(Some(goal_id))
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load goal: {}", e)))
}
