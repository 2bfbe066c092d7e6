/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register-first-user` - One-time bootstrap registration
/// - `POST /v1/auth/login` - Login and get a session token
/// - `POST /v1/auth/google` - Sign in with a pre-verified Google identity
/// - `POST /v1/auth/reset-password` - Reset password with a recovery code
use crate::{
    app::AppState,
    error::ApiResult,
    session::{self, Claims},
};
use ansa_core::{auth::credentials, bootstrap, provision};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// First-user registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterFirstUserRequest {
    /// Username (globally unique, case-sensitive)
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    pub username: String,

    /// Password
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// First-user registration response
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterFirstUserResponse {
    /// User ID
    pub user_id: String,

    /// The bootstrap workspace ID
    pub workspace_id: String,

    /// Plaintext recovery codes, shown exactly once
    pub recovery_codes: Vec<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    /// Password
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// User ID
    pub user_id: String,

    /// Username
    pub username: String,

    /// Default workspace ID
    pub workspace_id: String,

    /// Default workspace name
    pub workspace_name: String,

    /// Role in the default workspace
    pub role: String,

    /// Session token (24h)
    pub access_token: String,
}

/// Google sign-in request
///
/// The email arrives already verified by the OAuth flow upstream of this
/// server; this endpoint only maps the identity onto a user.
#[derive(Debug, Deserialize, Validate)]
pub struct GoogleSignInRequest {
    /// Verified email address, used as the username
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Google sign-in response
#[derive(Debug, Serialize, Deserialize)]
pub struct GoogleSignInResponse {
    /// User ID
    pub user_id: String,

    /// Default workspace ID
    pub workspace_id: String,

    /// Role in the default workspace
    pub role: String,

    /// Session token (24h)
    pub access_token: String,

    /// True when this sign-in created the account
    pub created: bool,

    /// Plaintext recovery codes, present only on first sign-in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_codes: Option<Vec<String>>,
}

/// Password reset request
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    /// Username
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    /// One of the recovery codes issued at account creation
    #[validate(length(min = 1, message = "Recovery code is required"))]
    pub recovery_code: String,

    /// New password
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Registers the first user of the system
///
/// Creates the first user, their personal workspace, and an admin default
/// membership. Succeeds at most once system-wide.
///
/// # Errors
///
/// - `403 Forbidden`: Initial setup already completed
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register_first_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterFirstUserRequest>,
) -> ApiResult<Json<RegisterFirstUserResponse>> {
    req.validate()?;

    let registration =
        bootstrap::register_first_user(&state.db, &req.username, &req.password).await?;

    Ok(Json(RegisterFirstUserResponse {
        user_id: registration.user.id.to_string(),
        workspace_id: registration.workspace.id.to_string(),
        recovery_codes: registration.recovery_codes,
    }))
}

/// Login endpoint
///
/// Authenticates a username/password pair and issues a session token for
/// the user's default workspace.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials (unknown username and wrong
///   password are indistinguishable)
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let authed = credentials::authenticate(&state.db, &req.username, &req.password).await?;

    let claims = Claims::new(authed.user_id, authed.workspace_id, authed.role);
    let access_token = session::create_token(&claims, state.jwt_secret())?;

    Ok(Json(LoginResponse {
        user_id: authed.user_id.to_string(),
        username: authed.username,
        workspace_id: authed.workspace_id.to_string(),
        workspace_name: authed.workspace_name,
        role: authed.role.as_str().to_string(),
        access_token,
    }))
}

/// Google sign-in endpoint
///
/// First sign-in provisions a user and personal workspace; later sign-ins
/// are idempotent. Recovery codes are returned only on the provisioning
/// call.
///
/// # Errors
///
/// - `409 Conflict`: The deterministic personal workspace name is taken
pub async fn google(
    State(state): State<AppState>,
    Json(req): Json<GoogleSignInRequest>,
) -> ApiResult<Json<GoogleSignInResponse>> {
    req.validate()?;

    let provisioned = provision::provision_from_external_identity(&state.db, &req.email).await?;

    let claims = Claims::new(
        provisioned.user.id,
        provisioned.workspace.id,
        provisioned.role,
    );
    let access_token = session::create_token(&claims, state.jwt_secret())?;

    Ok(Json(GoogleSignInResponse {
        user_id: provisioned.user.id.to_string(),
        workspace_id: provisioned.workspace.id.to_string(),
        role: provisioned.role.as_str().to_string(),
        access_token,
        created: provisioned.created,
        recovery_codes: provisioned.recovery_codes,
    }))
}

/// Password reset endpoint
///
/// Possession of a valid recovery code is the sole authorization factor;
/// the matched code is consumed.
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown username or unmatched code
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;

    credentials::reset_password(&state.db, &req.username, &req.recovery_code, &req.new_password)
        .await?;

    Ok(Json(serde_json::json!({})))
}
