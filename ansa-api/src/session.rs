/// JWT session issuance and validation
///
/// Encodes the (user, workspace, role) triple the core resolves at login
/// into a stateless HS256 token. Flows that invalidate a session
/// (self-demotion, self-removal, user deletion) rely on the consumer
/// re-authenticating; nothing here is revocable server-side.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Expiration**: 24 hours
/// - **Validation**: Signature, expiration, nbf, and issuer checks
/// - **Secret Management**: Secrets should be at least 32 bytes (256 bits)
use ansa_core::models::membership::WorkspaceRole;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token issuer claim value
const ISSUER: &str = "ansa";

/// Session lifetime
const SESSION_HOURS: i64 = 24;

/// Error type for session token operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Invalid issuer
    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer { expected: String },
}

/// JWT claims structure
///
/// # Standard Claims
///
/// - `sub`: Subject (user ID)
/// - `iss`: Issuer (always "ansa")
/// - `iat`: Issued at timestamp
/// - `exp`: Expiration timestamp
/// - `nbf`: Not before timestamp
///
/// # Custom Claims
///
/// - `workspace_id`: The session's workspace context
/// - `role`: The user's role in that workspace at issue time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    /// Issuer - Always "ansa"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Workspace ID (custom claim)
    pub workspace_id: Uuid,

    /// Role in the workspace (custom claim)
    pub role: WorkspaceRole,
}

impl Claims {
    /// Creates new claims with the 24 hour session expiry
    pub fn new(user_id: Uuid, workspace_id: Uuid, role: WorkspaceRole) -> Self {
        let now = Utc::now();
        let expiration = now + Duration::hours(SESSION_HOURS);

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            nbf: now.timestamp(),
            workspace_id,
            role,
        }
    }

    /// Creates claims with custom expiration (test support)
    pub fn with_expiration(
        user_id: Uuid,
        workspace_id: Uuid,
        role: WorkspaceRole,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();
        let expiration = now + expires_in;

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            nbf: now.timestamp(),
            workspace_id,
            role,
        }
    }

    /// Checks if the token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// The authenticated request identity injected by the JWT middleware
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
}

impl AuthContext {
    /// Builds the context from validated claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            workspace_id: claims.workspace_id,
            role: claims.role,
        }
    }
}

/// Creates a session token from claims
///
/// Signs the token using HS256 with the provided secret.
///
/// # Errors
///
/// Returns `SessionError::CreateError` if token encoding fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, SessionError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| SessionError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a session token and extracts claims
///
/// Verifies:
/// - Signature is valid
/// - Token hasn't expired
/// - Issuer is "ansa"
/// - Token is not used before nbf time
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, SessionError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => SessionError::InvalidIssuer {
            expected: ISSUER.to_string(),
        },
        _ => SessionError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
