/// Workspace model and database operations
///
/// This module provides the Workspace model (the WorkspaceStore). A workspace
/// is a named tenant boundary owning content and API quotas; its name is
/// globally unique and the unit of contention between explicit creation and
/// OAuth first-sign-in provisioning.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE workspaces (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL UNIQUE,
///     content_quota INTEGER,
///     api_daily_quota INTEGER,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Default content quota applied to auto-created workspaces
pub const DEFAULT_CONTENT_QUOTA: i32 = 50;

/// Default daily API call quota applied to auto-created workspaces
pub const DEFAULT_API_DAILY_QUOTA: i32 = 100;

/// Workspace model representing a tenant boundary
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    /// Unique workspace ID (UUID v4)
    pub id: Uuid,

    /// Workspace name (globally unique, editable after creation)
    pub name: String,

    /// Maximum number of content cards (None = unlimited)
    pub content_quota: Option<i32>,

    /// Maximum API calls per day (None = unlimited)
    pub api_daily_quota: Option<i32>,

    /// When the workspace was created
    pub created_at: DateTime<Utc>,

    /// When the workspace was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new workspace
///
/// Quotas are fixed at creation time; the edit path ignores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspace {
    /// Workspace name (must be globally unique)
    pub name: String,

    /// Content quota (defaults applied by the caller when absent)
    pub content_quota: Option<i32>,

    /// Daily API quota
    pub api_daily_quota: Option<i32>,
}

impl Workspace {
    /// Creates a new workspace
    ///
    /// Names are first-writer-wins: `ON CONFLICT (name) DO NOTHING` makes a
    /// concurrent creation race resolve with exactly one winner, and the
    /// loser sees `None` with no mutation.
    pub async fn create<'e, E>(
        executor: E,
        data: CreateWorkspace,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (name, content_quota, api_daily_quota)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, content_quota, api_daily_quota, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.content_quota)
        .bind(data.api_daily_quota)
        .fetch_optional(executor)
        .await
    }

    /// Finds a workspace by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            SELECT id, name, content_quota, api_daily_quota, created_at, updated_at
            FROM workspaces
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a workspace by name (case-sensitive)
    pub async fn find_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            SELECT id, name, content_quota, api_daily_quota, created_at, updated_at
            FROM workspaces
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    /// Locks a workspace row for the duration of the calling transaction
    ///
    /// Every ledger mutation that checks the admin count of a workspace
    /// takes this lock first, serializing the check with the mutation.
    pub async fn lock_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            SELECT id, name, content_quota, api_daily_quota, created_at, updated_at
            FROM workspaces
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Renames a workspace
    ///
    /// Returns `None` if the workspace does not exist. A name collision
    /// surfaces as a unique-violation database error for the caller to map
    /// to the empty result.
    pub async fn rename<'e, E>(
        executor: E,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            UPDATE workspaces
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, content_quota, api_daily_quota, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    /// Finds the oldest workspace (the one bootstrap created)
    pub async fn oldest<'e, E>(executor: E) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Workspace>(
            r#"
            SELECT id, name, content_quota, api_daily_quota, created_at, updated_at
            FROM workspaces
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(executor)
        .await
    }

    /// Counts all workspaces
    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces")
            .fetch_one(executor)
            .await?;

        Ok(count)
    }
}

/// Deterministic name for a user's auto-created personal workspace
///
/// Used by bootstrap and OAuth provisioning. The name participates in the
/// global uniqueness contract like any manually chosen name.
pub fn personal_workspace_name(owner: &str) -> String {
    format!("{}'s Workspace", owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_workspace_name() {
        assert_eq!(personal_workspace_name("suzin"), "suzin's Workspace");
        assert_eq!(
            personal_workspace_name("amir@example.com"),
            "amir@example.com's Workspace"
        );
    }

    #[test]
    fn test_default_quotas() {
        assert!(DEFAULT_CONTENT_QUOTA > 0);
        assert!(DEFAULT_API_DAILY_QUOTA > 0);
    }

    // Database-backed coverage lives in tests/ledger_tests.rs
}
