/// User model and database operations
///
/// This module provides the User model (the IdentityStore). Users belong to
/// workspaces via the `user_workspace` membership relation; a user with zero
/// memberships does not exist, so deletion here is always driven by the
/// ledger's cascade, never called ad hoc.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username TEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     recovery_codes TEXT[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// All operations take any `PgExecutor` so the ledger can drive them inside
/// a single transaction.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// User model representing an identity record
///
/// Passwords are stored as Argon2id hashes; recovery codes are stored as
/// SHA-256 digests of the codes issued once at creation. Neither is ever
/// serialized to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Username (case-sensitive, globally unique)
    pub username: String,

    /// Argon2id password hash (PHC string format)
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// SHA-256 digests of unused recovery codes
    #[serde(skip_serializing)]
    pub recovery_codes: Vec<String>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Username (must be globally unique)
    pub username: String,

    /// Argon2id password hash (not the plaintext password)
    pub password_hash: String,

    /// SHA-256 digests of the recovery codes issued to the user
    pub recovery_code_digests: Vec<String>,
}

impl User {
    /// Creates a new user
    ///
    /// Uses `ON CONFLICT (username) DO NOTHING` so a username race has
    /// exactly one winner; the loser observes `None` with no row written.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, recovery_codes)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, password_hash, recovery_codes, created_at, updated_at
            "#,
        )
        .bind(data.username)
        .bind(data.password_hash)
        .bind(data.recovery_code_digests)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, recovery_codes, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a user by username (case-sensitive)
    pub async fn find_by_username<'e, E>(
        executor: E,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, recovery_codes, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(executor)
        .await
    }

    /// Existence probe by username, no side effects
    pub async fn exists<'e, E>(executor: E, username: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(executor)
            .await
    }

    /// Counts all users
    ///
    /// Bootstrap runs this inside its transaction (under the advisory lock)
    /// as the "zero users exist" gate.
    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(executor)
            .await?;

        Ok(count)
    }

    /// Renames a user
    ///
    /// Returns `None` if the user does not exist. A username collision
    /// surfaces as a unique-violation database error for the caller to map.
    pub async fn rename<'e, E>(
        executor: E,
        id: Uuid,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, username, password_hash, recovery_codes, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(username)
        .fetch_optional(executor)
        .await
    }

    /// Replaces the password hash and removes one consumed recovery code
    ///
    /// Both writes happen in a single statement so a reset is atomic: the
    /// matched code digest is stripped from the array in the same UPDATE
    /// that installs the new hash.
    pub async fn reset_credentials<'e, E>(
        executor: E,
        id: Uuid,
        new_password_hash: &str,
        consumed_code_digest: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                recovery_codes = array_remove(recovery_codes, $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_password_hash)
        .bind(consumed_code_digest)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user by ID
    ///
    /// Only the ledger calls this, inside the same transaction that removed
    /// the user's last membership edge (invariant: a user with zero
    /// memberships does not exist).
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_struct() {
        let create = CreateUser {
            username: "suzin".to_string(),
            password_hash: "$argon2id$...".to_string(),
            recovery_code_digests: vec!["abc".to_string()],
        };

        assert_eq!(create.username, "suzin");
        assert_eq!(create.recovery_code_digests.len(), 1);
    }

    #[test]
    fn test_user_serialization_hides_credentials() {
        let user = User {
            id: Uuid::new_v4(),
            username: "suzin".to_string(),
            password_hash: "secret-hash".to_string(),
            recovery_codes: vec!["digest".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("recovery_codes"));
        assert!(json.contains("suzin"));
    }

    // Database-backed coverage lives in tests/ledger_tests.rs
}
