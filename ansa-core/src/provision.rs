/// OAuth identity provisioning
///
/// Maps an external (Google) identity onto a user. The external id is a
/// verified email address; verification transport lives upstream. The
/// email doubles as the username.
///
/// First sign-in creates the user plus a personal workspace named
/// deterministically from the email. That name participates in global name
/// uniqueness like any manually chosen name: if a human-created workspace
/// already holds it, provisioning fails `Conflict` with no mutation.
/// First writer wins; neither path ever takes over the other's name.
use sqlx::PgPool;
use tracing::info;

use crate::auth::{password, recovery};
use crate::error::{LedgerError, LedgerResult};
use crate::models::membership::{Membership, WorkspaceRole};
use crate::models::user::{CreateUser, User};
use crate::models::workspace::{
    personal_workspace_name, CreateWorkspace, Workspace, DEFAULT_API_DAILY_QUOTA,
    DEFAULT_CONTENT_QUOTA,
};

/// Result of provisioning an external identity
#[derive(Debug)]
pub struct Provisioned {
    pub user: User,
    pub workspace: Workspace,
    pub role: WorkspaceRole,

    /// True when this sign-in created the user
    pub created: bool,

    /// Plaintext recovery codes, present only on first sign-in
    pub recovery_codes: Option<Vec<String>>,
}

/// Resolves an external identity to a user, creating one on first sign-in
///
/// Idempotent for known identities: returns the existing user's default
/// workspace triple with no mutation.
pub async fn provision_from_external_identity(
    pool: &PgPool,
    external_id: &str,
) -> LedgerResult<Provisioned> {
    if let Some(existing) = resolve_existing(pool, external_id).await? {
        return Ok(existing);
    }

    // OAuth users authenticate upstream; the local credential is a random
    // throwaway so the password column stays non-null and unguessable.
    let password_hash = password::hash_password(&recovery::generate_code())
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    let codes = recovery::generate_codes();
    let digests = recovery::digest_all(&codes);

    let mut tx = pool.begin().await?;

    let workspace = Workspace::create(
        &mut *tx,
        CreateWorkspace {
            name: personal_workspace_name(external_id),
            content_quota: Some(DEFAULT_CONTENT_QUOTA),
            api_daily_quota: Some(DEFAULT_API_DAILY_QUOTA),
        },
    )
    .await?
    .ok_or_else(|| {
        LedgerError::Conflict(format!(
            "Workspace name '{}' already exists",
            personal_workspace_name(external_id)
        ))
    })?;

    let user = match User::create(
        &mut *tx,
        CreateUser {
            username: external_id.to_string(),
            password_hash,
            recovery_code_digests: digests,
        },
    )
    .await?
    {
        Some(user) => user,
        None => {
            // Lost a concurrent first-sign-in race for the same identity.
            // Roll back and resolve the winner's record instead.
            drop(tx);
            return resolve_existing(pool, external_id).await?.ok_or_else(|| {
                LedgerError::Conflict("Username already exists".to_string())
            });
        }
    };

    let membership =
        Membership::create(&mut *tx, user.id, workspace.id, WorkspaceRole::Admin, true)
            .await?
            .ok_or_else(|| LedgerError::Conflict("Membership already exists".to_string()))?;

    tx.commit().await?;

    info!(external_id, workspace = %workspace.name, "External identity provisioned");
    Ok(Provisioned {
        user,
        workspace,
        role: membership.role,
        created: true,
        recovery_codes: Some(codes),
    })
}

/// Looks up an already-provisioned identity and its default workspace
async fn resolve_existing(
    pool: &PgPool,
    external_id: &str,
) -> LedgerResult<Option<Provisioned>> {
    let Some(user) = User::find_by_username(pool, external_id).await? else {
        return Ok(None);
    };

    let edge = Membership::default_for_user(pool, user.id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("User has no default workspace".to_string()))?;

    let workspace = Workspace::find_by_id(pool, edge.workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Default workspace missing".to_string()))?;

    Ok(Some(Provisioned {
        user,
        workspace,
        role: edge.role,
        created: false,
        recovery_codes: None,
    }))
}
