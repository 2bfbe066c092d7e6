/// Authorization view: the read-side query engine
///
/// Answers "what can user X see" from ledger state. Scoping rule: a
/// requester sees the full member list of every workspace where they hold
/// the admin role, plus their own record everywhere. A read-only user with
/// no admin memberships sees only themself.
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::membership::WorkspaceRole;
use crate::models::workspace::Workspace;

/// One visible membership edge, joined with its workspace name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipView {
    pub workspace_id: Uuid,
    pub workspace_name: String,
    pub role: WorkspaceRole,
    pub is_default: bool,
}

/// A visible user with the memberships the requester may see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub user_id: Uuid,
    pub username: String,
    pub memberships: Vec<MembershipView>,
}

#[derive(Debug, sqlx::FromRow)]
struct VisibleRow {
    user_id: Uuid,
    username: String,
    workspace_id: Uuid,
    workspace_name: String,
    role: WorkspaceRole,
    is_default: bool,
}

/// Lists the users visible to a requester
///
/// Union of (a) every membership edge in workspaces where the requester is
/// admin and (b) the requester's own edges, deduplicated per user. Rows
/// are ordered so grouping is a single pass.
pub async fn visible_users(pool: &PgPool, requester: Uuid) -> LedgerResult<Vec<UserView>> {
    let rows = sqlx::query_as::<_, VisibleRow>(
        r#"
        WITH admin_workspaces AS (
            SELECT workspace_id
            FROM user_workspace
            WHERE user_id = $1 AND role = 'admin'
        )
        SELECT u.id AS user_id,
               u.username,
               w.id AS workspace_id,
               w.name AS workspace_name,
               uw.role,
               uw.is_default
        FROM user_workspace uw
        JOIN users u ON u.id = uw.user_id
        JOIN workspaces w ON w.id = uw.workspace_id
        WHERE uw.workspace_id IN (SELECT workspace_id FROM admin_workspaces)
           OR uw.user_id = $1
        ORDER BY u.username ASC, w.id ASC
        "#,
    )
    .bind(requester)
    .fetch_all(pool)
    .await?;

    Ok(group_rows(rows))
}

/// Returns full workspace detail, admin-only
///
/// # Errors
///
/// `NotFound` for an unknown id, `Forbidden` when the requester is not an
/// admin there.
pub async fn visible_workspace(
    pool: &PgPool,
    requester: Uuid,
    workspace_id: Uuid,
) -> LedgerResult<Workspace> {
    let workspace = Workspace::find_by_id(pool, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;

    let is_admin: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM user_workspace
            WHERE user_id = $1 AND workspace_id = $2 AND role = 'admin'
        )
        "#,
    )
    .bind(requester)
    .bind(workspace_id)
    .fetch_one(pool)
    .await?;

    if !is_admin {
        return Err(LedgerError::Forbidden(
            "Caller is not an admin of this workspace".to_string(),
        ));
    }

    Ok(workspace)
}

/// Lists a target user's memberships as scoped to the requester
///
/// A requester sees all of their own edges; for anyone else, the
/// intersection of the target's edges with the requester's admin
/// workspaces.
///
/// # Errors
///
/// `Forbidden` when the intersection is empty and requester != target.
pub async fn visible_workspaces_for_user(
    pool: &PgPool,
    requester: Uuid,
    target_user: Uuid,
) -> LedgerResult<Vec<MembershipView>> {
    let views = if requester == target_user {
        sqlx::query_as::<_, MembershipView>(
            r#"
            SELECT w.id AS workspace_id, w.name AS workspace_name, uw.role, uw.is_default
            FROM user_workspace uw
            JOIN workspaces w ON w.id = uw.workspace_id
            WHERE uw.user_id = $1
            ORDER BY w.id ASC
            "#,
        )
        .bind(target_user)
        .fetch_all(pool)
        .await?
    } else {
        let views = sqlx::query_as::<_, MembershipView>(
            r#"
            SELECT w.id AS workspace_id, w.name AS workspace_name, uw.role, uw.is_default
            FROM user_workspace uw
            JOIN workspaces w ON w.id = uw.workspace_id
            WHERE uw.user_id = $2
              AND uw.workspace_id IN (
                  SELECT workspace_id FROM user_workspace
                  WHERE user_id = $1 AND role = 'admin'
              )
            ORDER BY w.id ASC
            "#,
        )
        .bind(requester)
        .bind(target_user)
        .fetch_all(pool)
        .await?;

        if views.is_empty() {
            return Err(LedgerError::Forbidden(
                "Caller administers no workspace shared with this user".to_string(),
            ));
        }

        views
    };

    Ok(views)
}

fn group_rows(rows: Vec<VisibleRow>) -> Vec<UserView> {
    let mut users: Vec<UserView> = Vec::new();

    for row in rows {
        match users.last_mut() {
            Some(current) if current.user_id == row.user_id => {
                current.memberships.push(MembershipView {
                    workspace_id: row.workspace_id,
                    workspace_name: row.workspace_name,
                    role: row.role,
                    is_default: row.is_default,
                });
            }
            _ => {
                users.push(UserView {
                    user_id: row.user_id,
                    username: row.username,
                    memberships: vec![MembershipView {
                        workspace_id: row.workspace_id,
                        workspace_name: row.workspace_name,
                        role: row.role,
                        is_default: row.is_default,
                    }],
                });
            }
        }
    }

    users
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user_id: Uuid, username: &str, workspace_id: Uuid) -> VisibleRow {
        VisibleRow {
            user_id,
            username: username.to_string(),
            workspace_id,
            workspace_name: format!("ws-{}", workspace_id),
            role: WorkspaceRole::ReadOnly,
            is_default: false,
        }
    }

    #[test]
    fn test_group_rows_collapses_adjacent_users() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ws1 = Uuid::new_v4();
        let ws2 = Uuid::new_v4();

        let grouped = group_rows(vec![
            row(alice, "alice", ws1),
            row(alice, "alice", ws2),
            row(bob, "bob", ws1),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].username, "alice");
        assert_eq!(grouped[0].memberships.len(), 2);
        assert_eq!(grouped[1].username, "bob");
        assert_eq!(grouped[1].memberships.len(), 1);
    }

    #[test]
    fn test_group_rows_empty() {
        assert!(group_rows(vec![]).is_empty());
    }

    // Scoping behavior against real data is covered in
    // tests/ledger_tests.rs.
}
