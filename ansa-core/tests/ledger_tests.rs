/// Database-backed tests for the membership core
///
/// Covers the ledger's transactional behavior: the last-admin defense,
/// cascading user deletion, default re-election, bootstrap gating, OAuth
/// provisioning, credential flows, and visibility scoping. Tests skip when
/// `DATABASE_URL` is unset.
mod common;

use ansa_core::auth::credentials;
use ansa_core::bootstrap;
use ansa_core::error::LedgerError;
use ansa_core::ledger::{self, Actor, NewUser, UpdateUser, UpdateWorkspace};
use ansa_core::models::membership::{Membership, WorkspaceRole};
use ansa_core::models::user::User;
use ansa_core::models::workspace::CreateWorkspace;
use ansa_core::provision;
use ansa_core::view;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[tokio::test]
async fn test_bootstrap_succeeds_exactly_once() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (registration, _) = common::bootstrap_first(&db.pool, "suzin").await;
    assert_eq!(registration.workspace.name, "suzin's Workspace");
    assert!(registration.membership.role.is_admin());
    assert!(registration.membership.is_default);
    assert!(!registration.recovery_codes.is_empty());

    let second = bootstrap::register_first_user(&db.pool, "intruder", common::TEST_PASSWORD).await;
    assert!(matches!(second, Err(LedgerError::Forbidden(_))));

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_concurrent_bootstrap_has_one_winner() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (a, b) = tokio::join!(
        bootstrap::register_first_user(&db.pool, "alice", common::TEST_PASSWORD),
        bootstrap::register_first_user(&db.pool, "bob", common::TEST_PASSWORD),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "Exactly one concurrent bootstrap must win");

    let user_count = User::count(&db.pool).await.unwrap();
    assert_eq!(user_count, 1);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_create_user_rejects_duplicate_username() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;
    common::create_member(
        &db.pool,
        actor,
        "mark",
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;

    let duplicate = ledger::create_and_add_user(
        &db.pool,
        actor,
        NewUser {
            username: "mark".to_string(),
            password: common::TEST_PASSWORD.to_string(),
        },
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;
    assert!(matches!(duplicate, Err(LedgerError::Conflict(_))));

    db.teardown().await;
}

#[tokio::test]
async fn test_create_user_requires_admin() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;
    let mark = common::create_member(
        &db.pool,
        actor,
        "mark",
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;

    let mark_actor = Actor {
        user_id: mark,
        workspace_id: reg.workspace.id,
    };
    let result = ledger::create_and_add_user(
        &db.pool,
        mark_actor,
        NewUser {
            username: "zia".to_string(),
            password: common::TEST_PASSWORD.to_string(),
        },
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;
    assert!(matches!(result, Err(LedgerError::Forbidden(_))));

    db.teardown().await;
}

#[tokio::test]
async fn test_removing_last_membership_deletes_user() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;
    let mark = common::create_member(
        &db.pool,
        actor,
        "mark",
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;

    let removal = ledger::remove_membership(&db.pool, actor, mark, reg.workspace.id)
        .await
        .unwrap();
    assert!(removal.user_deleted);
    assert!(!removal.requires_workspace_switch);

    assert!(!ledger::check_user_exists(&db.pool, "mark").await.unwrap());

    let login = credentials::authenticate(&db.pool, "mark", common::TEST_PASSWORD).await;
    assert!(matches!(login, Err(LedgerError::Unauthorized(_))));

    // Retried removal of the gone edge is a clean NotFound.
    let retry = ledger::remove_membership(&db.pool, actor, mark, reg.workspace.id).await;
    assert!(matches!(retry, Err(LedgerError::NotFound(_))));

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_sole_admin_cannot_be_demoted_or_removed() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;

    let demotion = ledger::change_role(
        &db.pool,
        actor,
        actor.user_id,
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;
    assert!(matches!(demotion, Err(LedgerError::InvariantViolation(_))));

    let removal = ledger::remove_membership(&db.pool, actor, actor.user_id, reg.workspace.id).await;
    assert!(matches!(removal, Err(LedgerError::InvariantViolation(_))));

    // The failed operations left the edge untouched.
    let role = Membership::role_of(&db.pool, actor.user_id, reg.workspace.id)
        .await
        .unwrap();
    assert!(matches!(role, Some(WorkspaceRole::Admin)));

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

/// Two concurrent self-removals from a two-admin workspace must not
/// jointly empty the admin set: the workspace row lock serializes them,
/// and the loser re-reads an admin count of one and is rejected.
#[tokio::test]
async fn test_concurrent_removals_leave_an_admin() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let carlos = common::create_member(
        &db.pool,
        suzin,
        "carlos",
        reg.workspace.id,
        WorkspaceRole::Admin,
    )
    .await;
    let carlos_actor = Actor {
        user_id: carlos,
        workspace_id: reg.workspace.id,
    };

    // Each removal alone is legal (two admins exist); together they would
    // leave zero.
    let (a, b) = tokio::join!(
        ledger::remove_membership(&db.pool, suzin, suzin.user_id, reg.workspace.id),
        ledger::remove_membership(&db.pool, carlos_actor, carlos, reg.workspace.id),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "Exactly one concurrent removal may win");
    for result in [&a, &b] {
        if let Err(e) = result {
            assert!(matches!(e, LedgerError::InvariantViolation(_)));
        }
    }

    let admins = Membership::admin_count(&db.pool, reg.workspace.id)
        .await
        .unwrap();
    assert_eq!(admins, 1);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

/// Same race through the role-change path: two admins demoting themselves
/// at once, exactly one may succeed.
#[tokio::test]
async fn test_concurrent_demotions_leave_an_admin() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let carlos = common::create_member(
        &db.pool,
        suzin,
        "carlos",
        reg.workspace.id,
        WorkspaceRole::Admin,
    )
    .await;
    let carlos_actor = Actor {
        user_id: carlos,
        workspace_id: reg.workspace.id,
    };

    let (a, b) = tokio::join!(
        ledger::change_role(
            &db.pool,
            suzin,
            suzin.user_id,
            reg.workspace.id,
            WorkspaceRole::ReadOnly,
        ),
        ledger::change_role(
            &db.pool,
            carlos_actor,
            carlos,
            reg.workspace.id,
            WorkspaceRole::ReadOnly,
        ),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "Exactly one concurrent demotion may win");
    for result in [&a, &b] {
        if let Err(e) = result {
            assert!(matches!(e, LedgerError::InvariantViolation(_)));
        }
    }

    let admins = Membership::admin_count(&db.pool, reg.workspace.id)
        .await
        .unwrap();
    assert_eq!(admins, 1);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_self_demotion_signals_session_invalidation() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;
    common::create_member(
        &db.pool,
        actor,
        "carlos",
        reg.workspace.id,
        WorkspaceRole::Admin,
    )
    .await;

    // Two admins exist, so suzin may demote herself; the result carries
    // the re-authentication signal.
    let change = ledger::change_role(
        &db.pool,
        actor,
        actor.user_id,
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await
    .unwrap();
    assert!(change.session_invalidated);
    assert!(!change.membership.role.is_admin());

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

/// A combined rename + role change commits together or not at all: when
/// the role leg is rejected, the rename must not survive.
#[tokio::test]
async fn test_edit_user_rolls_back_on_invariant_violation() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, actor) = common::bootstrap_first(&db.pool, "suzin").await;

    // Demoting the sole admin fails; the rename in the same edit must
    // roll back with it.
    let rejected = ledger::edit_user(
        &db.pool,
        actor,
        actor.user_id,
        reg.workspace.id,
        UpdateUser {
            username: Some("renamed".to_string()),
            role: Some(WorkspaceRole::ReadOnly),
        },
    )
    .await;
    assert!(matches!(rejected, Err(LedgerError::InvariantViolation(_))));

    assert!(ledger::check_user_exists(&db.pool, "suzin").await.unwrap());
    assert!(!ledger::check_user_exists(&db.pool, "renamed").await.unwrap());

    // With a second admin present the same edit succeeds as a whole.
    common::create_member(
        &db.pool,
        actor,
        "carlos",
        reg.workspace.id,
        WorkspaceRole::Admin,
    )
    .await;

    let edit = ledger::edit_user(
        &db.pool,
        actor,
        actor.user_id,
        reg.workspace.id,
        UpdateUser {
            username: Some("renamed".to_string()),
            role: Some(WorkspaceRole::ReadOnly),
        },
    )
    .await
    .unwrap();
    assert!(edit.session_invalidated);
    assert!(ledger::check_user_exists(&db.pool, "renamed").await.unwrap());
    assert!(!ledger::check_user_exists(&db.pool, "suzin").await.unwrap());

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

/// The Suzin/Carlos scenario: removing Carlos from a workspace he shares
/// with another admin succeeds; removing him from the workspace where he
/// is the sole admin fails.
#[tokio::test]
async fn test_shared_admin_removal_scenario() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let ws_suzin = common::create_workspace(&db.pool, suzin, "Suzin").await;
    let suzin_in_suzin = Actor {
        user_id: suzin.user_id,
        workspace_id: ws_suzin.id,
    };

    let carlos =
        common::create_member(&db.pool, suzin_in_suzin, "carlos", ws_suzin.id, WorkspaceRole::Admin)
            .await;
    let carlos_actor = Actor {
        user_id: carlos,
        workspace_id: ws_suzin.id,
    };
    let ws_carlos = common::create_workspace(&db.pool, carlos_actor, "Carlos").await;

    // Suzin remains admin of "Suzin", so Carlos can leave it.
    let removal = ledger::remove_membership(&db.pool, suzin_in_suzin, carlos, ws_suzin.id)
        .await
        .unwrap();
    assert!(!removal.user_deleted);

    // Carlos is now the sole admin of "Carlos"; removing him must fail.
    let blocked = ledger::remove_membership(&db.pool, carlos_actor, carlos, ws_carlos.id).await;
    assert!(matches!(blocked, Err(LedgerError::InvariantViolation(_))));

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

/// The Poornima scenario: removing the default edge while other edges
/// remain re-elects a new default and reports its name.
#[tokio::test]
async fn test_default_reelection_on_removal() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let ws_suzin = common::create_workspace(&db.pool, suzin, "Suzin").await;
    let suzin_in_suzin = Actor {
        user_id: suzin.user_id,
        workspace_id: ws_suzin.id,
    };

    let amir =
        common::create_member(&db.pool, suzin_in_suzin, "amir", ws_suzin.id, WorkspaceRole::Admin)
            .await;
    let amir_actor = Actor {
        user_id: amir,
        workspace_id: ws_suzin.id,
    };
    let ws_amir = common::create_workspace(&db.pool, amir_actor, "Amir").await;

    // Poornima's first (default) edge is in "Amir"; a second admin edge
    // lands in "Suzin".
    let amir_in_amir = Actor {
        user_id: amir,
        workspace_id: ws_amir.id,
    };
    let poornima =
        common::create_member(&db.pool, amir_in_amir, "poornima", ws_amir.id, WorkspaceRole::Admin)
            .await;
    ledger::add_membership(
        &db.pool,
        suzin_in_suzin,
        poornima,
        ws_suzin.id,
        WorkspaceRole::Admin,
        false,
    )
    .await
    .unwrap();

    let poornima_actor = Actor {
        user_id: poornima,
        workspace_id: ws_amir.id,
    };
    let removal = ledger::remove_membership(&db.pool, poornima_actor, poornima, ws_amir.id)
        .await
        .unwrap();

    assert!(!removal.user_deleted);
    assert!(removal.requires_workspace_switch);
    assert_eq!(removal.default_workspace.as_deref(), Some("Suzin"));

    let new_default = Membership::default_for_user(&db.pool, poornima)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(new_default.workspace_id, ws_suzin.id);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_switch_default() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let ws_second = common::create_workspace(&db.pool, suzin, "Second").await;

    let switched = ledger::switch_default(&db.pool, suzin.user_id, ws_second.id)
        .await
        .unwrap();
    assert!(switched.is_default);
    assert_eq!(switched.workspace_id, ws_second.id);

    // Idempotent per edge.
    let again = ledger::switch_default(&db.pool, suzin.user_id, ws_second.id)
        .await
        .unwrap();
    assert!(again.is_default);

    // Not a member -> Forbidden; unknown workspace -> NotFound.
    let outsider = common::create_member(
        &db.pool,
        suzin,
        "mark",
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;
    let forbidden = ledger::switch_default(&db.pool, outsider, ws_second.id).await;
    assert!(matches!(forbidden, Err(LedgerError::Forbidden(_))));

    let missing = ledger::switch_default(&db.pool, suzin.user_id, uuid::Uuid::new_v4()).await;
    assert!(matches!(missing, Err(LedgerError::NotFound(_))));

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_duplicate_workspace_creation_is_empty_and_pure() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    common::create_workspace(&db.pool, suzin, "Research").await;

    let edges_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_workspace")
        .fetch_one(&db.pool)
        .await
        .unwrap();

    let duplicate = ledger::create_workspace(
        &db.pool,
        suzin,
        CreateWorkspace {
            name: "Research".to_string(),
            content_quota: None,
            api_daily_quota: None,
        },
    )
    .await
    .unwrap();
    assert!(duplicate.is_none());

    let edges_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_workspace")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(edges_before, edges_after, "Lost name race must not mutate");

    db.teardown().await;
}

#[tokio::test]
async fn test_update_workspace_rename_and_collision() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let ws_a = common::create_workspace(&db.pool, suzin, "Alpha").await;
    common::create_workspace(&db.pool, suzin, "Beta").await;

    let renamed = ledger::update_workspace(
        &db.pool,
        suzin,
        ws_a.id,
        UpdateWorkspace {
            name: Some("Gamma".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(renamed.name, "Gamma");

    let collision = ledger::update_workspace(
        &db.pool,
        suzin,
        ws_a.id,
        UpdateWorkspace {
            name: Some("Beta".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(collision.is_none());

    // Quota fields are ignored by the edit path.
    let untouched = ledger::update_workspace(
        &db.pool,
        suzin,
        ws_a.id,
        UpdateWorkspace {
            name: None,
            content_quota: Some(9999),
            api_daily_quota: Some(9999),
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(untouched.content_quota, renamed.content_quota);
    assert_eq!(untouched.api_daily_quota, renamed.api_daily_quota);

    db.teardown().await;
}

#[tokio::test]
async fn test_add_membership_default_handling() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    let ws_second = common::create_workspace(&db.pool, suzin, "Second").await;
    let mark = common::create_member(
        &db.pool,
        suzin,
        "mark",
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
    )
    .await;

    // Duplicate edge is a conflict.
    let dup = ledger::add_membership(
        &db.pool,
        suzin,
        mark,
        reg.workspace.id,
        WorkspaceRole::ReadOnly,
        false,
    )
    .await;
    assert!(matches!(dup, Err(LedgerError::Conflict(_))));

    // as_default moves the default to the new edge.
    let suzin_in_second = Actor {
        user_id: suzin.user_id,
        workspace_id: ws_second.id,
    };
    let edge = ledger::add_membership(
        &db.pool,
        suzin_in_second,
        mark,
        ws_second.id,
        WorkspaceRole::ReadOnly,
        true,
    )
    .await
    .unwrap();
    assert!(edge.is_default);

    let old_default = Membership::find(&db.pool, mark, reg.workspace.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!old_default.is_default);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_visibility_scoping() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, root) = common::bootstrap_first(&db.pool, "root").await;
    let ws_a = common::create_workspace(&db.pool, root, "A").await;
    let ws_b = common::create_workspace(&db.pool, root, "B").await;
    let ws_c = common::create_workspace(&db.pool, root, "C").await;

    let root_in_a = Actor {
        user_id: root.user_id,
        workspace_id: ws_a.id,
    };
    let alice =
        common::create_member(&db.pool, root_in_a, "alice", ws_a.id, WorkspaceRole::Admin).await;
    ledger::add_membership(
        &db.pool,
        Actor {
            user_id: root.user_id,
            workspace_id: ws_b.id,
        },
        alice,
        ws_b.id,
        WorkspaceRole::Admin,
        false,
    )
    .await
    .unwrap();

    let bob = common::create_member(&db.pool, root_in_a, "bob", ws_a.id, WorkspaceRole::ReadOnly)
        .await;
    let carol = common::create_member(
        &db.pool,
        Actor {
            user_id: root.user_id,
            workspace_id: ws_c.id,
        },
        "carol",
        ws_c.id,
        WorkspaceRole::ReadOnly,
    )
    .await;

    // Alice administers A and B: she sees herself, bob (in A), and root
    // (member of A and B), but nothing of C's membership.
    let visible = view::visible_users(&db.pool, alice).await.unwrap();
    let names: Vec<&str> = visible.iter().map(|u| u.username.as_str()).collect();
    assert!(names.contains(&"alice"));
    assert!(names.contains(&"bob"));
    assert!(names.contains(&"root"));
    assert!(!names.contains(&"carol"));

    // Root's edges visible to alice are scoped to A and B only.
    let root_view = visible
        .iter()
        .find(|u| u.username == "root")
        .expect("root should be visible");
    assert!(root_view
        .memberships
        .iter()
        .all(|m| m.workspace_id == ws_a.id || m.workspace_id == ws_b.id));

    // A read-only user with no admin memberships sees only themself.
    let bob_sees = view::visible_users(&db.pool, bob).await.unwrap();
    assert_eq!(bob_sees.len(), 1);
    assert_eq!(bob_sees[0].username, "bob");

    // Workspace detail is admin-only.
    let denied = view::visible_workspace(&db.pool, bob, ws_a.id).await;
    assert!(matches!(denied, Err(LedgerError::Forbidden(_))));
    let detail = view::visible_workspace(&db.pool, alice, ws_a.id).await.unwrap();
    assert_eq!(detail.id, ws_a.id);

    // Membership listing for another user intersects with the requester's
    // admin workspaces; empty intersection is Forbidden.
    let carol_via_alice = view::visible_workspaces_for_user(&db.pool, alice, carol).await;
    assert!(matches!(carol_via_alice, Err(LedgerError::Forbidden(_))));
    let own = view::visible_workspaces_for_user(&db.pool, bob, bob).await.unwrap();
    assert_eq!(own.len(), 1);

    db.teardown().await;
}

#[tokio::test]
async fn test_oauth_provisioning_is_idempotent() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    common::bootstrap_first(&db.pool, "suzin").await;

    let first = provision::provision_from_external_identity(&db.pool, "pat@example.com")
        .await
        .unwrap();
    assert!(first.created);
    assert!(first.recovery_codes.is_some());
    assert_eq!(first.workspace.name, "pat@example.com's Workspace");
    assert!(first.role.is_admin());

    let second = provision::provision_from_external_identity(&db.pool, "pat@example.com")
        .await
        .unwrap();
    assert!(!second.created);
    assert!(second.recovery_codes.is_none());
    assert_eq!(second.user.id, first.user.id);
    assert_eq!(second.workspace.id, first.workspace.id);

    common::assert_invariants(&db.pool).await;
    db.teardown().await;
}

#[tokio::test]
async fn test_oauth_provisioning_respects_name_ownership() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (_, suzin) = common::bootstrap_first(&db.pool, "suzin").await;
    // A manually created workspace already holds the deterministic name.
    common::create_workspace(&db.pool, suzin, "pat@example.com's Workspace").await;

    let users_before = User::count(&db.pool).await.unwrap();
    let result = provision::provision_from_external_identity(&db.pool, "pat@example.com").await;
    assert!(matches!(result, Err(LedgerError::Conflict(_))));

    let users_after = User::count(&db.pool).await.unwrap();
    assert_eq!(users_before, users_after, "Failed provisioning must not mutate");

    db.teardown().await;
}

#[tokio::test]
async fn test_authenticate_and_reset_password() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, _) = common::bootstrap_first(&db.pool, "suzin").await;

    let authed = credentials::authenticate(&db.pool, "suzin", common::TEST_PASSWORD)
        .await
        .unwrap();
    assert_eq!(authed.workspace_id, reg.workspace.id);
    assert!(authed.role.is_admin());

    // Unknown user and wrong password are indistinguishable.
    let unknown = credentials::authenticate(&db.pool, "ghost", common::TEST_PASSWORD).await;
    let wrong = credentials::authenticate(&db.pool, "suzin", "not-the-password").await;
    match (unknown, wrong) {
        (Err(LedgerError::Unauthorized(a)), Err(LedgerError::Unauthorized(b))) => {
            assert_eq!(a, b);
        }
        other => panic!("Expected Unauthorized for both, got {:?}", other),
    }

    // Reset with a recovery code, then confirm the code is single-use.
    let code = reg.recovery_codes[0].clone();
    credentials::reset_password(&db.pool, "suzin", &code, "a-brand-new-password")
        .await
        .unwrap();

    credentials::authenticate(&db.pool, "suzin", "a-brand-new-password")
        .await
        .unwrap();
    let old = credentials::authenticate(&db.pool, "suzin", common::TEST_PASSWORD).await;
    assert!(matches!(old, Err(LedgerError::Unauthorized(_))));

    let replay = credentials::reset_password(&db.pool, "suzin", &code, "yet-another-password").await;
    assert!(matches!(replay, Err(LedgerError::Unauthorized(_))));

    db.teardown().await;
}

/// Seeded random operation sequences never break the admin-count or
/// single-default invariants; failed operations leave no partial state.
#[tokio::test]
async fn test_random_operation_sequence_preserves_invariants() {
    let Some(db) = common::TestDb::try_new().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let (reg, root) = common::bootstrap_first(&db.pool, "root").await;
    let mut workspaces = vec![reg.workspace.id];
    for name in ["W1", "W2"] {
        workspaces.push(common::create_workspace(&db.pool, root, name).await.id);
    }

    let mut users = vec![root.user_id];
    for (i, name) in ["u1", "u2", "u3"].iter().enumerate() {
        let ws = workspaces[i % workspaces.len()];
        users.push(
            common::create_member(
                &db.pool,
                Actor {
                    user_id: root.user_id,
                    workspace_id: ws,
                },
                name,
                ws,
                WorkspaceRole::ReadOnly,
            )
            .await,
        );
    }

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..120 {
        let user = users[rng.gen_range(0..users.len())];
        let ws = workspaces[rng.gen_range(0..workspaces.len())];
        let actor = Actor {
            user_id: root.user_id,
            workspace_id: ws,
        };

        // Outcomes are allowed to fail; the invariants must hold either
        // way. Root is never removed so an admin actor always exists.
        let _ = match rng.gen_range(0..4) {
            0 => ledger::add_membership(&db.pool, actor, user, ws, WorkspaceRole::ReadOnly, false)
                .await
                .map(|_| ()),
            1 => {
                let role = if rng.gen_bool(0.5) {
                    WorkspaceRole::Admin
                } else {
                    WorkspaceRole::ReadOnly
                };
                ledger::change_role(&db.pool, actor, user, ws, role).await.map(|_| ())
            }
            2 if user != root.user_id => {
                ledger::remove_membership(&db.pool, actor, user, ws).await.map(|_| ())
            }
            _ => ledger::switch_default(&db.pool, user, ws).await.map(|_| ()),
        };

        common::assert_invariants(&db.pool).await;
    }

    db.teardown().await;
}
