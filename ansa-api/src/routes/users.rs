/// User and membership management endpoints
///
/// All routes here require a valid session token; the injected
/// [`AuthContext`] supplies the acting user and their session workspace.
///
/// # Endpoints
///
/// - `POST   /v1/users` - Create a user with their first membership
/// - `GET    /v1/users` - List visible users
/// - `POST   /v1/users/add-existing` - Add an existing user to a workspace
/// - `GET    /v1/users/exists/:username` - Username existence probe
/// - `PUT    /v1/users/:id` - Rename and/or change role
/// - `DELETE /v1/users/:id` - Remove a membership (cascades on last edge)
/// - `GET    /v1/users/:id/workspaces` - A user's visible memberships
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    session::AuthContext,
};
use ansa_core::{
    ledger::{self, Actor, NewUser, UpdateUser},
    models::{membership::WorkspaceRole, user::User, workspace::Workspace},
    view,
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn actor(ctx: &AuthContext) -> Actor {
    Actor {
        user_id: ctx.user_id,
        workspace_id: ctx.workspace_id,
    }
}

fn parse_role(role: &str) -> ApiResult<WorkspaceRole> {
    match role {
        "admin" => Ok(WorkspaceRole::Admin),
        "read_only" => Ok(WorkspaceRole::ReadOnly),
        other => Err(ApiError::BadRequest(format!("Unknown role: {}", other))),
    }
}

/// Create-user request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    /// Username (globally unique, case-sensitive)
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    pub username: String,

    /// Password
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Role in the target workspace
    pub role: String,

    /// Target workspace; defaults to the caller's session workspace
    pub workspace_id: Option<Uuid>,
}

/// Create-user response
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    /// User ID
    pub user_id: String,

    /// Plaintext recovery codes, shown exactly once
    pub recovery_codes: Vec<String>,
}

/// Add-existing-user request; names are resolved server-side
#[derive(Debug, Deserialize, Validate)]
pub struct AddExistingUserRequest {
    /// Username of the existing user
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    /// Target workspace name
    #[validate(length(min = 1, message = "Workspace name is required"))]
    pub workspace_name: String,

    /// Role for the new edge
    pub role: String,

    /// Make the new edge the user's default
    #[serde(default)]
    pub as_default: bool,
}

/// Edit-user request; both fields optional, applied as one atomic edit
#[derive(Debug, Deserialize, Validate)]
pub struct EditUserRequest {
    /// New username
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    pub username: Option<String>,

    /// New role in the target workspace
    pub role: Option<String>,

    /// Workspace for the role change; defaults to the caller's session
    /// workspace
    pub workspace_id: Option<Uuid>,
}

/// Edit-user response
#[derive(Debug, Serialize, Deserialize)]
pub struct EditUserResponse {
    /// True when the caller demoted themself below admin and must
    /// re-authenticate
    pub session_invalidated: bool,
}

/// Remove-user query parameters
#[derive(Debug, Deserialize)]
pub struct RemoveUserQuery {
    /// Workspace to remove the user from, by name; defaults to the
    /// caller's session workspace
    pub workspace_name: Option<String>,
}

/// Remove-user response
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveUserResponse {
    /// The removed edge was the user's last; the account is gone
    pub user_deleted: bool,

    /// The user survives but must switch workspace context
    pub requires_workspace_switch: bool,

    /// Name of the newly elected default workspace, when re-elected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_workspace: Option<String>,
}

/// Username existence response
#[derive(Debug, Serialize, Deserialize)]
pub struct UserExistsResponse {
    pub exists: bool,
}

/// Creates a new user with their first membership
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin of the target workspace
/// - `409 Conflict`: Username already exists
pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<CreateUserResponse>> {
    req.validate()?;
    let role = parse_role(&req.role)?;
    let workspace_id = req.workspace_id.unwrap_or(ctx.workspace_id);

    let created = ledger::create_and_add_user(
        &state.db,
        actor(&ctx),
        NewUser {
            username: req.username,
            password: req.password,
        },
        workspace_id,
        role,
    )
    .await?;

    Ok(Json(CreateUserResponse {
        user_id: created.user.id.to_string(),
        recovery_codes: created.recovery_codes,
    }))
}

/// Adds an existing user to a workspace by name
///
/// # Errors
///
/// - `404 Not Found`: Unknown username or workspace name
/// - `409 Conflict`: The membership already exists
pub async fn add_existing_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<AddExistingUserRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;
    let role = parse_role(&req.role)?;

    let user = User::find_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let workspace = Workspace::find_by_name(&state.db, &req.workspace_name)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;

    ledger::add_membership(
        &state.db,
        actor(&ctx),
        user.id,
        workspace.id,
        role,
        req.as_default,
    )
    .await?;

    Ok(Json(serde_json::json!({})))
}

/// Username existence probe
pub async fn user_exists(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<UserExistsResponse>> {
    let exists = ledger::check_user_exists(&state.db, &username).await?;
    Ok(Json(UserExistsResponse { exists }))
}

/// Edits a user: rename and/or role change
///
/// The rename applies globally; the role change targets one workspace.
/// Both apply in a single transaction, so a rejected edit changes nothing.
/// `session_invalidated` is true when the caller demoted themself below
/// admin.
///
/// # Errors
///
/// - `400 Bad Request`: Demoting the sole admin of a workspace
/// - `409 Conflict`: New username already taken
pub async fn edit_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<EditUserRequest>,
) -> ApiResult<Json<EditUserResponse>> {
    req.validate()?;

    // Renaming someone else requires administering a workspace they belong
    // to; the view probe fails Forbidden otherwise.
    if req.username.is_some() && user_id != ctx.user_id {
        view::visible_workspaces_for_user(&state.db, ctx.user_id, user_id).await?;
    }

    let role = req.role.as_deref().map(parse_role).transpose()?;
    let workspace_id = req.workspace_id.unwrap_or(ctx.workspace_id);

    let edit = ledger::edit_user(
        &state.db,
        actor(&ctx),
        user_id,
        workspace_id,
        UpdateUser {
            username: req.username,
            role,
        },
    )
    .await?;

    Ok(Json(EditUserResponse {
        session_invalidated: edit.session_invalidated,
    }))
}

/// Removes a user's membership from a workspace
///
/// Removing the last membership deletes the account. Removing the default
/// edge re-elects a new default and reports its name.
///
/// # Errors
///
/// - `400 Bad Request`: Removing the sole admin of the workspace
/// - `404 Not Found`: Unknown workspace name or no such membership
pub async fn remove_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RemoveUserQuery>,
) -> ApiResult<Json<RemoveUserResponse>> {
    let workspace_id = match &query.workspace_name {
        Some(name) => {
            Workspace::find_by_name(&state.db, name)
                .await?
                .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?
                .id
        }
        None => ctx.workspace_id,
    };

    let removal = ledger::remove_membership(&state.db, actor(&ctx), user_id, workspace_id).await?;

    Ok(Json(RemoveUserResponse {
        user_deleted: removal.user_deleted,
        requires_workspace_switch: removal.requires_workspace_switch,
        default_workspace: removal.default_workspace,
    }))
}

/// Lists the users visible to the caller
pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<view::UserView>>> {
    let users = view::visible_users(&state.db, ctx.user_id).await?;
    Ok(Json(users))
}

/// Lists a user's memberships as visible to the caller
///
/// # Errors
///
/// - `403 Forbidden`: The caller administers no workspace shared with the
///   target user
pub async fn user_workspaces(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<view::MembershipView>>> {
    let memberships = view::visible_workspaces_for_user(&state.db, ctx.user_id, user_id).await?;
    Ok(Json(memberships))
}
