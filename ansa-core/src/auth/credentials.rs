/// Credential verification and recovery flows
///
/// `authenticate` resolves a username/password pair into the
/// (user, workspace, role) triple the session issuer encodes. Unknown
/// username and wrong password are indistinguishable to the caller.
///
/// `reset_password` consumes a recovery code: possession of a valid code is
/// the sole authorization factor, and the matched code is removed in the
/// same transaction that installs the new hash.
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{password, recovery};
use crate::error::{LedgerError, LedgerResult};
use crate::models::membership::{Membership, WorkspaceRole};
use crate::models::user::User;
use crate::models::workspace::Workspace;

/// The authenticated triple handed to the session issuer
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub workspace_id: Uuid,
    pub workspace_name: String,
    pub role: WorkspaceRole,
}

/// Verifies a username/password pair and resolves the default workspace
///
/// # Errors
///
/// `Unauthorized` for an unknown username or a wrong password; the two
/// cases return the same detail string.
pub async fn authenticate(
    pool: &PgPool,
    username: &str,
    plaintext: &str,
) -> LedgerResult<AuthenticatedUser> {
    let bad_credentials = || LedgerError::Unauthorized("Invalid username or password".to_string());

    let user = User::find_by_username(pool, username)
        .await?
        .ok_or_else(bad_credentials)?;

    let valid = password::verify_password(plaintext, &user.password_hash)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    if !valid {
        warn!(username, "Failed login attempt");
        return Err(bad_credentials());
    }

    // Invariant: a user exists iff they have >= 1 membership, so the
    // default edge must be present.
    let edge = Membership::default_for_user(pool, user.id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("User has no default workspace".to_string()))?;

    let workspace = Workspace::find_by_id(pool, edge.workspace_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("Default workspace missing".to_string()))?;

    Ok(AuthenticatedUser {
        user_id: user.id,
        username: user.username,
        workspace_id: workspace.id,
        workspace_name: workspace.name,
        role: edge.role,
    })
}

/// Resets a password using a recovery code
///
/// The code is single-use: the matched digest is stripped from the stored
/// set in the same transaction that replaces the hash, so a replayed reset
/// with the same code fails `Unauthorized`.
///
/// # Errors
///
/// `Unauthorized` for an unknown username or an unmatched code.
pub async fn reset_password(
    pool: &PgPool,
    username: &str,
    recovery_code: &str,
    new_password: &str,
) -> LedgerResult<()> {
    let new_hash = password::hash_password(new_password)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;

    let mut tx = pool.begin().await?;

    // Lock the user row so two resets with the same code serialize and
    // exactly one consumes it.
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, recovery_codes, created_at, updated_at
        FROM users
        WHERE username = $1
        FOR UPDATE
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| LedgerError::Unauthorized("Invalid username or recovery code".to_string()))?;

    let matched = recovery::match_digest(recovery_code, &user.recovery_codes)
        .ok_or_else(|| LedgerError::Unauthorized("Invalid username or recovery code".to_string()))?
        .to_string();

    User::reset_credentials(&mut *tx, user.id, &new_hash, &matched).await?;

    tx.commit().await?;

    info!(username, "Password reset via recovery code");
    Ok(())
}
