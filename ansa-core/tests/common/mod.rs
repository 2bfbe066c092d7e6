/// Common test utilities for database-backed tests
///
/// Each test gets its own uniquely-named database created from the
/// `DATABASE_URL` base, migrated, and dropped on teardown. Tests skip when
/// `DATABASE_URL` is unset so the suite still runs without Postgres.
use ansa_core::bootstrap::{self, Registration};
use ansa_core::db::migrations;
use ansa_core::ledger::{self, Actor, NewUser};
use ansa_core::models::membership::WorkspaceRole;
use ansa_core::models::workspace::{CreateWorkspace, Workspace};
use sqlx::PgPool;
use uuid::Uuid;

pub struct TestDb {
    pub pool: PgPool,
    url: String,
}

impl TestDb {
    /// Creates a fresh migrated database, or `None` when `DATABASE_URL` is
    /// unset
    pub async fn try_new() -> Option<Self> {
        let base_url = std::env::var("DATABASE_URL").ok()?;

        let (server, _) = base_url
            .rsplit_once('/')
            .expect("DATABASE_URL must contain a database path");
        let url = format!("{}/ansa_test_{}", server, Uuid::new_v4().simple());

        migrations::ensure_database_exists(&url)
            .await
            .expect("Failed to create test database");

        let pool = PgPool::connect(&url)
            .await
            .expect("Failed to connect to test database");

        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Some(Self { pool, url })
    }

    /// Drops the per-test database
    pub async fn teardown(self) {
        self.pool.close().await;
        migrations::drop_database(&self.url)
            .await
            .expect("Failed to drop test database");
    }
}

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Bootstraps the system with a first user
pub async fn bootstrap_first(pool: &PgPool, username: &str) -> (Registration, Actor) {
    let registration = bootstrap::register_first_user(pool, username, TEST_PASSWORD)
        .await
        .expect("Bootstrap should succeed");
    let actor = Actor {
        user_id: registration.user.id,
        workspace_id: registration.workspace.id,
    };
    (registration, actor)
}

/// Creates a user with a first membership in the given workspace
pub async fn create_member(
    pool: &PgPool,
    actor: Actor,
    username: &str,
    workspace_id: Uuid,
    role: WorkspaceRole,
) -> Uuid {
    let created = ledger::create_and_add_user(
        pool,
        actor,
        NewUser {
            username: username.to_string(),
            password: TEST_PASSWORD.to_string(),
        },
        workspace_id,
        role,
    )
    .await
    .expect("User creation should succeed");
    created.user.id
}

/// Creates a workspace with the actor as admin
pub async fn create_workspace(pool: &PgPool, actor: Actor, name: &str) -> Workspace {
    ledger::create_workspace(
        pool,
        actor,
        CreateWorkspace {
            name: name.to_string(),
            content_quota: None,
            api_daily_quota: None,
        },
    )
    .await
    .expect("Workspace creation should succeed")
    .expect("Workspace name should be free")
}

/// Asserts the two storage invariants every test sequence must preserve:
/// every workspace has at least one admin, and every user has exactly one
/// default edge
pub async fn assert_invariants(pool: &PgPool) {
    let orphan_workspaces: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM workspaces w
        WHERE NOT EXISTS (
            SELECT 1 FROM user_workspace uw
            WHERE uw.workspace_id = w.id AND uw.role = 'admin'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .expect("Invariant query should succeed");
    assert_eq!(orphan_workspaces, 0, "Workspace with zero admins");

    let bad_defaults: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users u
        WHERE (SELECT COUNT(*) FROM user_workspace uw
               WHERE uw.user_id = u.id AND uw.is_default) != 1
        "#,
    )
    .fetch_one(pool)
    .await
    .expect("Invariant query should succeed");
    assert_eq!(bad_defaults, 0, "User without exactly one default edge");
}
