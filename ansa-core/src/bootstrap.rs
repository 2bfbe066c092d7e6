/// One-time first-user registration
///
/// Bootstrap seeds the system before any other user or workspace exists:
/// it creates the first user, their personal workspace, and an admin
/// default membership in one transaction. It may succeed at most once
/// system-wide.
///
/// The "zero users exist" gate runs under a transaction-scoped Postgres
/// advisory lock, so two concurrent first calls serialize and exactly one
/// wins; the loser observes the winner's committed user row and fails
/// `Forbidden`.
use sqlx::PgPool;
use tracing::info;

use crate::auth::{password, recovery};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{self, Actor, NewUser};
use crate::models::membership::{Membership, WorkspaceRole};
use crate::models::user::{CreateUser, User};
use crate::models::workspace::{
    personal_workspace_name, CreateWorkspace, Workspace, DEFAULT_API_DAILY_QUOTA,
    DEFAULT_CONTENT_QUOTA,
};

/// Advisory lock key guarding the zero-users check
const BOOTSTRAP_LOCK_KEY: i64 = 0x616e_7361;

/// Result of a successful bootstrap
#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub workspace: Workspace,
    pub membership: Membership,
    /// Plaintext recovery codes, returned exactly once
    pub recovery_codes: Vec<String>,
}

/// Registers the first user of the system
///
/// # Errors
///
/// `Forbidden` ("initial setup already completed") on any call after the
/// first successful one, including the loser of a concurrent race.
pub async fn register_first_user(
    pool: &PgPool,
    username: &str,
    plaintext: &str,
) -> LedgerResult<Registration> {
    let password_hash = password::hash_password(plaintext)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    let codes = recovery::generate_codes();
    let digests = recovery::digest_all(&codes);

    let mut tx = pool.begin().await?;

    // Held until commit; serializes the existence check with the writes.
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(BOOTSTRAP_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    if User::count(&mut *tx).await? > 0 {
        return Err(LedgerError::Forbidden(
            "Initial setup already completed".to_string(),
        ));
    }

    let user = User::create(
        &mut *tx,
        CreateUser {
            username: username.to_string(),
            password_hash,
            recovery_code_digests: digests,
        },
    )
    .await?
    .ok_or_else(|| LedgerError::Conflict("Username already exists".to_string()))?;

    let workspace = Workspace::create(
        &mut *tx,
        CreateWorkspace {
            name: personal_workspace_name(username),
            content_quota: Some(DEFAULT_CONTENT_QUOTA),
            api_daily_quota: Some(DEFAULT_API_DAILY_QUOTA),
        },
    )
    .await?
    .ok_or_else(|| LedgerError::Conflict("Workspace name already exists".to_string()))?;

    let membership =
        Membership::create(&mut *tx, user.id, workspace.id, WorkspaceRole::Admin, true)
            .await?
            .ok_or_else(|| LedgerError::Conflict("Membership already exists".to_string()))?;

    tx.commit().await?;

    info!(username, workspace = %workspace.name, "First user registered");
    Ok(Registration {
        user,
        workspace,
        membership,
        recovery_codes: codes,
    })
}

/// Adds a user to the bootstrap workspace
///
/// The "admin invites the next user" story: an ordinary
/// [`ledger::create_and_add_user`] targeting the oldest workspace in the
/// system.
///
/// # Errors
///
/// `NotFound` when bootstrap has not run yet.
pub async fn add_second_user(
    pool: &PgPool,
    actor: Actor,
    username: &str,
    plaintext: &str,
    role: WorkspaceRole,
) -> LedgerResult<ledger::CreatedUser> {
    let workspace = Workspace::oldest(pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound("No workspace exists yet".to_string()))?;

    ledger::create_and_add_user(
        pool,
        actor,
        NewUser {
            username: username.to_string(),
            password: plaintext.to_string(),
        },
        workspace.id,
        role,
    )
    .await
}
