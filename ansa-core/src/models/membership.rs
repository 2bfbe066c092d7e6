/// Membership model and database operations
///
/// This module provides the membership edge: the many-to-many relation
/// between users and workspaces, each edge carrying a role and a default
/// flag. The edge is the unit the ledger manages; all invariant checks run
/// against this relation.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE workspace_role AS ENUM ('admin', 'read_only');
///
/// CREATE TABLE user_workspace (
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     workspace_id UUID NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
///     role workspace_role NOT NULL DEFAULT 'read_only',
///     is_default BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (user_id, workspace_id)
/// );
/// ```
///
/// A partial unique index on `(user_id) WHERE is_default` backs the
/// exactly-one-default invariant at the storage layer.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Role attached to a membership edge
///
/// A closed two-variant value; authorization checks are table lookups over
/// this enum, never a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workspace_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    /// Can manage members, content, and workspace settings
    Admin,

    /// Read-only access to workspace content
    ReadOnly,
}

impl WorkspaceRole {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::ReadOnly => "read_only",
        }
    }

    /// True for the admin role
    pub fn is_admin(&self) -> bool {
        matches!(self, WorkspaceRole::Admin)
    }
}

/// Membership edge between a user and a workspace
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    /// User ID
    pub user_id: Uuid,

    /// Workspace ID
    pub workspace_id: Uuid,

    /// Role within the workspace
    pub role: WorkspaceRole,

    /// Whether this is the user's default workspace
    pub is_default: bool,

    /// When the membership was created
    pub created_at: DateTime<Utc>,
}

const MEMBERSHIP_COLUMNS: &str = "user_id, workspace_id, role, is_default, created_at";

impl Membership {
    /// Creates a membership edge
    ///
    /// Returns `None` when the edge already exists (`ON CONFLICT DO
    /// NOTHING`), which the ledger reports as `Conflict`.
    pub async fn create<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
        role: WorkspaceRole,
        is_default: bool,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO user_workspace (user_id, workspace_id, role, is_default)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, workspace_id) DO NOTHING
            RETURNING user_id, workspace_id, role, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(role)
        .bind(is_default)
        .fetch_optional(executor)
        .await
    }

    /// Finds a specific edge by user and workspace
    pub async fn find<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspace WHERE user_id = $1 AND workspace_id = $2"
        ))
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(executor)
        .await
    }

    /// Gets a user's role in a workspace, if they are a member
    pub async fn role_of<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT role FROM user_workspace WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(executor)
        .await
    }

    /// Counts admin edges of a workspace
    ///
    /// Callers must hold the workspace row lock for this count to be
    /// trustworthy across the rest of the transaction.
    pub async fn admin_count<'e, E>(executor: E, workspace_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_workspace WHERE workspace_id = $1 AND role = 'admin'",
        )
        .bind(workspace_id)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Updates the role on an edge
    pub async fn update_role<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE user_workspace
            SET role = $3
            WHERE user_id = $1 AND workspace_id = $2
            RETURNING user_id, workspace_id, role, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(role)
        .fetch_optional(executor)
        .await
    }

    /// Deletes an edge, returning the deleted row
    ///
    /// `None` means the edge was already gone, which the ledger reports as
    /// `NotFound` (retry-safe removal).
    pub async fn delete<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            DELETE FROM user_workspace
            WHERE user_id = $1 AND workspace_id = $2
            RETURNING user_id, workspace_id, role, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(executor)
        .await
    }

    /// Lists all edges of a user, ordered by workspace id
    pub async fn list_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspace WHERE user_id = $1 ORDER BY workspace_id ASC"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Locks all of a user's edges for the duration of the transaction
    ///
    /// Taken before electing or flipping a user's default edge so two
    /// concurrent default changes serialize.
    pub async fn lock_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspace WHERE user_id = $1 ORDER BY workspace_id ASC FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Lists all edges of a workspace
    pub async fn list_by_workspace<'e, E>(
        executor: E,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspace WHERE workspace_id = $1 ORDER BY created_at ASC"
        ))
        .bind(workspace_id)
        .fetch_all(executor)
        .await
    }

    /// Gets the user's default edge, if any
    pub async fn default_for_user<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspace WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Clears the user's current default flag
    ///
    /// Must run before setting a new default: the partial unique index
    /// rejects two default edges for one user.
    pub async fn clear_default<'e, E>(executor: E, user_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE user_workspace SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Sets the default flag on one edge
    pub async fn set_default<'e, E>(
        executor: E,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE user_workspace
            SET is_default = TRUE
            WHERE user_id = $1 AND workspace_id = $2
            RETURNING user_id, workspace_id, role, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(executor)
        .await
    }

    /// Counts a user's edges
    pub async fn count_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_workspace WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(executor)
                .await?;

        Ok(count)
    }
}
