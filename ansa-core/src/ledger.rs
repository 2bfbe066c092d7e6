/// Membership ledger: the invariant-enforcing mutation surface
///
/// Every mutating operation here runs in a single transaction. Operations
/// that touch a workspace's member set first lock the workspace row
/// (`SELECT ... FOR UPDATE`), which serializes the admin-count check with
/// the mutation and closes the last-admin race: two concurrent removals
/// cannot both observe "not the last admin" and jointly leave zero admins.
/// Operations that elect or flip a user's default edge lock the user's
/// membership rows for the same reason.
///
/// Invariants upheld after every transaction:
/// 1. Every workspace has at least one admin membership.
/// 2. Usernames and workspace names are globally unique.
/// 3. A user has exactly one default edge iff they have >= 1 edge.
/// 4. A user with zero edges does not exist (cascading delete, same
///    transaction).
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{password, recovery};
use crate::error::{LedgerError, LedgerResult};
use crate::models::membership::{Membership, WorkspaceRole};
use crate::models::user::{CreateUser, User};
use crate::models::workspace::{
    CreateWorkspace, Workspace, DEFAULT_API_DAILY_QUOTA, DEFAULT_CONTENT_QUOTA,
};

/// The caller's session identity, threaded into operations that enforce
/// authorization or emit session signals
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    /// The calling user
    pub user_id: Uuid,

    /// The workspace the caller's session is currently scoped to
    pub workspace_id: Uuid,
}

/// Input for creating a user through the ledger
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

/// Result of creating a user with their first membership
#[derive(Debug)]
pub struct CreatedUser {
    pub user: User,
    pub membership: Membership,
    /// Plaintext recovery codes, returned exactly once
    pub recovery_codes: Vec<String>,
}

/// Result of a role change
#[derive(Debug)]
pub struct RoleChange {
    pub membership: Membership,

    /// True when the actor demoted themself below admin; the session layer
    /// must force re-authentication. The ledger never touches session
    /// state itself.
    pub session_invalidated: bool,
}

/// Result of a membership removal
#[derive(Debug)]
pub struct Removal {
    /// The removed edge was the user's last; the user record and its
    /// credentials are gone and the consumer must treat any session for
    /// them as dead.
    pub user_deleted: bool,

    /// The user survives but must land somewhere else: either their
    /// default edge moved, or they removed themself from their active
    /// session workspace.
    pub requires_workspace_switch: bool,

    /// Name of the newly elected default workspace, when the removed edge
    /// was the default and other edges remain.
    pub default_workspace: Option<String>,
}

/// Fields accepted by the user edit path
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub role: Option<WorkspaceRole>,
}

/// Result of a user edit
#[derive(Debug)]
pub struct UserEdit {
    /// True when the actor demoted themself below admin; the session layer
    /// must force re-authentication.
    pub session_invalidated: bool,
}

/// Fields accepted by the workspace edit path
///
/// Quota fields are carried for wire compatibility but ignored: quotas are
/// fixed at creation time.
#[derive(Debug, Clone, Default)]
pub struct UpdateWorkspace {
    pub name: Option<String>,
    pub content_quota: Option<i32>,
    pub api_daily_quota: Option<i32>,
}

/// Requires the actor to hold the admin role in a workspace
async fn require_admin(
    tx: &mut Transaction<'_, Postgres>,
    actor: Actor,
    workspace_id: Uuid,
) -> LedgerResult<()> {
    match Membership::role_of(&mut **tx, actor.user_id, workspace_id).await? {
        Some(role) if role.is_admin() => Ok(()),
        _ => Err(LedgerError::Forbidden(
            "Caller is not an admin of this workspace".to_string(),
        )),
    }
}

/// Adds an existing user to a workspace
///
/// Fails `Conflict` if the edge already exists. If the user has no default
/// edge yet, `as_default` is forced true; if `as_default` is requested and
/// a default exists, the default moves to the new edge.
pub async fn add_membership(
    pool: &PgPool,
    actor: Actor,
    user_id: Uuid,
    workspace_id: Uuid,
    role: WorkspaceRole,
    as_default: bool,
) -> LedgerResult<Membership> {
    let mut tx = pool.begin().await?;

    Workspace::lock_by_id(&mut *tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;
    require_admin(&mut tx, actor, workspace_id).await?;

    User::find_by_id(&mut *tx, user_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("User not found".to_string()))?;

    let edges = Membership::lock_by_user(&mut *tx, user_id).await?;
    if edges.iter().any(|e| e.workspace_id == workspace_id) {
        return Err(LedgerError::Conflict(
            "User is already a member of this workspace".to_string(),
        ));
    }

    let has_default = edges.iter().any(|e| e.is_default);
    let make_default = as_default || !has_default;
    if make_default && has_default {
        Membership::clear_default(&mut *tx, user_id).await?;
    }

    let membership = Membership::create(&mut *tx, user_id, workspace_id, role, make_default)
        .await?
        .ok_or_else(|| {
            LedgerError::Conflict("User is already a member of this workspace".to_string())
        })?;

    tx.commit().await?;

    info!(%user_id, %workspace_id, role = role.as_str(), "Membership added");
    Ok(membership)
}

/// Creates a new user atomically with their first membership
///
/// The first edge is always the default. Fails `Conflict` if the username
/// is taken.
pub async fn create_and_add_user(
    pool: &PgPool,
    actor: Actor,
    new_user: NewUser,
    workspace_id: Uuid,
    role: WorkspaceRole,
) -> LedgerResult<CreatedUser> {
    let password_hash = password::hash_password(&new_user.password)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    let codes = recovery::generate_codes();
    let digests = recovery::digest_all(&codes);

    let mut tx = pool.begin().await?;

    Workspace::lock_by_id(&mut *tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;
    require_admin(&mut tx, actor, workspace_id).await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            username: new_user.username.clone(),
            password_hash,
            recovery_code_digests: digests,
        },
    )
    .await?
    .ok_or_else(|| LedgerError::Conflict("Username already exists".to_string()))?;

    let membership = Membership::create(&mut *tx, user.id, workspace_id, role, true)
        .await?
        .ok_or_else(|| LedgerError::Conflict("Membership already exists".to_string()))?;

    tx.commit().await?;

    info!(username = %new_user.username, %workspace_id, "User created with first membership");
    Ok(CreatedUser {
        user,
        membership,
        recovery_codes: codes,
    })
}

/// Role change within an open transaction: workspace lock, admin check,
/// sole-admin defense, then the update
async fn apply_role_change(
    tx: &mut Transaction<'_, Postgres>,
    actor: Actor,
    user_id: Uuid,
    workspace_id: Uuid,
    new_role: WorkspaceRole,
) -> LedgerResult<Membership> {
    Workspace::lock_by_id(&mut **tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;
    require_admin(tx, actor, workspace_id).await?;

    let edge = Membership::find(&mut **tx, user_id, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("User is not a member of this workspace".to_string()))?;

    if edge.role.is_admin() && !new_role.is_admin() {
        let admins = Membership::admin_count(&mut **tx, workspace_id).await?;
        if admins <= 1 {
            warn!(%user_id, %workspace_id, "Rejected demotion of sole admin");
            return Err(LedgerError::InvariantViolation(
                "Workspace would be left without an admin".to_string(),
            ));
        }
    }

    Membership::update_role(&mut **tx, user_id, workspace_id, new_role)
        .await?
        .ok_or_else(|| LedgerError::NotFound("User is not a member of this workspace".to_string()))
}

/// Changes the role on an existing edge
///
/// Fails `InvariantViolation` when demoting the sole admin of the
/// workspace. Reports `session_invalidated` when the actor demoted
/// themself below admin.
pub async fn change_role(
    pool: &PgPool,
    actor: Actor,
    user_id: Uuid,
    workspace_id: Uuid,
    new_role: WorkspaceRole,
) -> LedgerResult<RoleChange> {
    let mut tx = pool.begin().await?;

    let membership = apply_role_change(&mut tx, actor, user_id, workspace_id, new_role).await?;

    tx.commit().await?;

    let session_invalidated = actor.user_id == user_id && !new_role.is_admin();
    info!(%user_id, %workspace_id, role = new_role.as_str(), session_invalidated, "Role changed");

    Ok(RoleChange {
        membership,
        session_invalidated,
    })
}

/// Edits a user: rename and/or role change, as one atomic operation
///
/// The rename applies globally; the role change targets one workspace.
/// Both legs run in a single transaction, so a rejected edit (sole-admin
/// demotion, name conflict) leaves neither applied. Fails `Conflict` when
/// the new username is taken.
pub async fn edit_user(
    pool: &PgPool,
    actor: Actor,
    user_id: Uuid,
    workspace_id: Uuid,
    data: UpdateUser,
) -> LedgerResult<UserEdit> {
    let mut tx = pool.begin().await?;

    let mut session_invalidated = false;
    if let Some(role) = data.role {
        apply_role_change(&mut tx, actor, user_id, workspace_id, role).await?;
        session_invalidated = actor.user_id == user_id && !role.is_admin();
    }

    if let Some(username) = &data.username {
        match User::rename(&mut *tx, user_id, username).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(LedgerError::NotFound("User not found".to_string())),
            Err(e) => {
                let err = LedgerError::from(e);
                if err.is_unique_violation() {
                    return Err(LedgerError::Conflict("Username already exists".to_string()));
                }
                return Err(err);
            }
        }
    }

    tx.commit().await?;

    info!(%user_id, session_invalidated, "User edited");
    Ok(UserEdit {
        session_invalidated,
    })
}

/// Removes a membership edge, cascading to the user when it was their last
///
/// Fails `InvariantViolation` when the target is the sole admin of the
/// workspace. Deleting the last edge deletes the user record, credentials
/// and recovery codes included, in the same transaction. Deleting the
/// default edge while other edges remain re-elects the lowest remaining
/// workspace id as the new default.
///
/// A retried removal of an already-removed edge returns `NotFound` with no
/// mutation.
pub async fn remove_membership(
    pool: &PgPool,
    actor: Actor,
    user_id: Uuid,
    workspace_id: Uuid,
) -> LedgerResult<Removal> {
    let mut tx = pool.begin().await?;

    Workspace::lock_by_id(&mut *tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;

    // Self-removal is allowed for any role; removing someone else requires
    // admin in the target workspace.
    if actor.user_id != user_id {
        require_admin(&mut tx, actor, workspace_id).await?;
    }

    let edges = Membership::lock_by_user(&mut *tx, user_id).await?;
    let edge = edges
        .iter()
        .find(|e| e.workspace_id == workspace_id)
        .cloned()
        .ok_or_else(|| LedgerError::NotFound("User is not a member of this workspace".to_string()))?;

    if edge.role.is_admin() {
        let admins = Membership::admin_count(&mut *tx, workspace_id).await?;
        if admins <= 1 {
            warn!(%user_id, %workspace_id, "Rejected removal of sole admin");
            return Err(LedgerError::InvariantViolation(
                "Workspace would be left without an admin".to_string(),
            ));
        }
    }

    Membership::delete(&mut *tx, user_id, workspace_id).await?;

    let remaining: Vec<&Membership> = edges
        .iter()
        .filter(|e| e.workspace_id != workspace_id)
        .collect();

    let removal = if remaining.is_empty() {
        // Invariant 4: a user with zero memberships does not exist. The
        // edge deletion and the user deletion commit together or not at
        // all.
        User::delete(&mut *tx, user_id).await?;
        Removal {
            user_deleted: true,
            requires_workspace_switch: false,
            default_workspace: None,
        }
    } else {
        let mut default_workspace = None;
        if edge.is_default {
            // Deterministic re-election: lowest remaining workspace id.
            // `remaining` is already ordered by workspace id.
            let new_default = remaining[0];
            Membership::set_default(&mut *tx, user_id, new_default.workspace_id).await?;
            default_workspace = Workspace::find_by_id(&mut *tx, new_default.workspace_id)
                .await?
                .map(|w| w.name);
        }

        let left_active_workspace =
            actor.user_id == user_id && actor.workspace_id == workspace_id;

        Removal {
            user_deleted: false,
            requires_workspace_switch: edge.is_default || left_active_workspace,
            default_workspace,
        }
    };

    tx.commit().await?;

    info!(
        %user_id,
        %workspace_id,
        user_deleted = removal.user_deleted,
        requires_workspace_switch = removal.requires_workspace_switch,
        "Membership removed"
    );
    Ok(removal)
}

/// Moves the user's default flag to another of their workspaces
///
/// Fails `NotFound` for an unknown workspace and `Forbidden` when the user
/// holds no edge there. Idempotent when the workspace is already the
/// default.
pub async fn switch_default(
    pool: &PgPool,
    user_id: Uuid,
    workspace_id: Uuid,
) -> LedgerResult<Membership> {
    let mut tx = pool.begin().await?;

    Workspace::find_by_id(&mut *tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;

    let edges = Membership::lock_by_user(&mut *tx, user_id).await?;
    if !edges.iter().any(|e| e.workspace_id == workspace_id) {
        return Err(LedgerError::Forbidden(
            "User is not a member of this workspace".to_string(),
        ));
    }

    Membership::clear_default(&mut *tx, user_id).await?;
    let membership = Membership::set_default(&mut *tx, user_id, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Membership disappeared during switch".to_string()))?;

    tx.commit().await?;

    info!(%user_id, %workspace_id, "Default workspace switched");
    Ok(membership)
}

/// Side-effect-free existence probe by username
pub async fn check_user_exists(pool: &PgPool, username: &str) -> LedgerResult<bool> {
    Ok(User::exists(pool, username).await?)
}

/// Explicitly creates a workspace, adding the actor as its first admin
///
/// Returns `Ok(None)` on a name collision with no mutation: the explicit
/// path never takes over an existing name, and consumers surface the empty
/// result rather than an error. The creating actor becomes admin in the
/// same transaction, so invariant 1 holds from birth.
pub async fn create_workspace(
    pool: &PgPool,
    actor: Actor,
    data: CreateWorkspace,
) -> LedgerResult<Option<Workspace>> {
    let data = CreateWorkspace {
        name: data.name,
        content_quota: data.content_quota.or(Some(DEFAULT_CONTENT_QUOTA)),
        api_daily_quota: data.api_daily_quota.or(Some(DEFAULT_API_DAILY_QUOTA)),
    };

    let mut tx = pool.begin().await?;

    let workspace = match Workspace::create(&mut *tx, data).await? {
        Some(w) => w,
        None => return Ok(None),
    };

    let edges = Membership::lock_by_user(&mut *tx, actor.user_id).await?;
    let has_default = edges.iter().any(|e| e.is_default);

    Membership::create(
        &mut *tx,
        actor.user_id,
        workspace.id,
        WorkspaceRole::Admin,
        !has_default,
    )
    .await?;

    tx.commit().await?;

    info!(name = %workspace.name, "Workspace created");
    Ok(Some(workspace))
}

/// Edits a workspace
///
/// Admin-only. Renames honor global name uniqueness and return `Ok(None)`
/// on a collision with no mutation; quota fields in the payload are
/// silently ignored.
pub async fn update_workspace(
    pool: &PgPool,
    actor: Actor,
    workspace_id: Uuid,
    data: UpdateWorkspace,
) -> LedgerResult<Option<Workspace>> {
    let mut tx = pool.begin().await?;

    let workspace = Workspace::lock_by_id(&mut *tx, workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Workspace not found".to_string()))?;
    require_admin(&mut tx, actor, workspace_id).await?;

    let workspace = match data.name {
        Some(name) if name != workspace.name => {
            match Workspace::rename(&mut *tx, workspace_id, &name).await {
                Ok(Some(w)) => w,
                Ok(None) => {
                    return Err(LedgerError::NotFound("Workspace not found".to_string()))
                }
                Err(e) => {
                    let err = LedgerError::from(e);
                    if err.is_unique_violation() {
                        // Name race lost: no mutation, empty result.
                        return Ok(None);
                    }
                    return Err(err);
                }
            }
        }
        _ => workspace,
    };

    tx.commit().await?;

    info!(%workspace_id, name = %workspace.name, "Workspace updated");
    Ok(Some(workspace))
}
