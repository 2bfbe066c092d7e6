/// Workspace management endpoints
///
/// # Endpoints
///
/// - `POST /v1/workspaces` - Create a workspace (caller becomes its admin)
/// - `GET  /v1/workspaces/:id` - Workspace detail (admin-only)
/// - `PUT  /v1/workspaces/:id` - Rename a workspace
/// - `POST /v1/workspaces/switch` - Switch the caller's default workspace
///
/// Create and edit return a one-element array on success and an empty
/// array on a name collision, both HTTP 200: a lost name race is an
/// empty result for the consumer to re-prompt on, not an error.
use crate::{
    app::AppState,
    error::ApiResult,
    session::{self, AuthContext, Claims},
};
use ansa_core::{
    ledger::{self, Actor, UpdateWorkspace},
    models::workspace::{CreateWorkspace, Workspace},
    view,
};
use axum::{
    extract::{Path, State},
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

/// Workspace representation on the wire
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub id: String,
    pub name: String,
    pub content_quota: Option<i32>,
    pub api_daily_quota: Option<i32>,
}

impl From<Workspace> for WorkspaceResponse {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id.to_string(),
            name: w.name,
            content_quota: w.content_quota,
            api_daily_quota: w.api_daily_quota,
        }
    }
}

/// Create-workspace request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    /// Workspace name (globally unique)
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Content quota; None falls back to the platform default
    pub content_quota: Option<i32>,

    /// Daily API quota; None falls back to the platform default
    pub api_daily_quota: Option<i32>,
}

/// Edit-workspace request
///
/// Quota fields are accepted for wire compatibility but ignored.
#[derive(Debug, Deserialize, Validate)]
pub struct EditWorkspaceRequest {
    /// New workspace name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub content_quota: Option<i32>,

    pub api_daily_quota: Option<i32>,
}

/// Switch-workspace request
#[derive(Debug, Deserialize)]
pub struct SwitchWorkspaceRequest {
    /// Workspace to make the caller's default
    pub workspace_id: Uuid,
}

/// Switch-workspace response
#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchWorkspaceResponse {
    /// The new default workspace
    pub workspace_id: String,

    /// The caller's role there
    pub role: String,

    /// Fresh session token scoped to the new workspace
    pub access_token: String,
}

/// Creates a workspace with the caller as its first admin
///
/// Returns `[workspace]` on success, `[]` on a name collision.
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Vec<WorkspaceResponse>>> {
    req.validate()?;

    let created = ledger::create_workspace(
        &state.db,
        actor(&ctx),
        CreateWorkspace {
            name: req.name,
            content_quota: req.content_quota,
            api_daily_quota: req.api_daily_quota,
        },
    )
    .await?;

    Ok(Json(created.into_iter().map(Into::into).collect()))
}

/// Workspace detail, admin-only
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin of the workspace
/// - `404 Not Found`: Unknown workspace
pub async fn get_workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = view::visible_workspace(&state.db, ctx.user_id, workspace_id).await?;
    Ok(Json(workspace.into()))
}

/// Renames a workspace
///
/// Returns `[workspace]` on success, `[]` on a name collision. Quota
/// fields in the payload are ignored.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin of the workspace
pub async fn edit_workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(workspace_id): Path<Uuid>,
    Json(req): Json<EditWorkspaceRequest>,
) -> ApiResult<Json<Vec<WorkspaceResponse>>> {
    req.validate()?;

    let updated = ledger::update_workspace(
        &state.db,
        actor(&ctx),
        workspace_id,
        UpdateWorkspace {
            name: req.name,
            content_quota: req.content_quota,
            api_daily_quota: req.api_daily_quota,
        },
    )
    .await?;

    Ok(Json(updated.into_iter().map(Into::into).collect()))
}

/// Switches the caller's default workspace and reissues the session
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not a member of the target workspace
/// - `404 Not Found`: Unknown workspace
pub async fn switch_workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<SwitchWorkspaceRequest>,
) -> ApiResult<Json<SwitchWorkspaceResponse>> {
    let membership = ledger::switch_default(&state.db, ctx.user_id, req.workspace_id).await?;

    let claims = Claims::new(ctx.user_id, membership.workspace_id, membership.role);
    let access_token = session::create_token(&claims, state.jwt_secret())?;

    Ok(Json(SwitchWorkspaceResponse {
        workspace_id: membership.workspace_id.to_string(),
        role: membership.role.as_str().to_string(),
        access_token,
    }))
}
