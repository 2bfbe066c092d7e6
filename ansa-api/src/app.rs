/// Application state and router builder
///
/// Defines the shared application state and builds the Axum router with all
/// routes and middleware.
use crate::{
    config::Config,
    middleware::security::SecurityHeadersLayer,
    session::{self, AuthContext},
};
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor. Uses Arc
/// internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// ├── /v1/
/// │   ├── /auth/                       # Public authentication endpoints
/// │   │   ├── POST /register-first-user
/// │   │   ├── POST /login
/// │   │   ├── POST /google
/// │   │   └── POST /reset-password
/// │   ├── /users/                      # Membership management (JWT)
/// │   │   ├── POST   /
/// │   │   ├── GET    /
/// │   │   ├── POST   /add-existing
/// │   │   ├── GET    /exists/:username
/// │   │   ├── PUT    /:id
/// │   │   ├── DELETE /:id
/// │   │   └── GET    /:id/workspaces
/// │   └── /workspaces/                 # Workspace management (JWT)
/// │       ├── POST /
/// │       ├── GET  /:id
/// │       ├── PUT  /:id
/// │       └── POST /switch
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Security headers
/// 4. JWT authentication (protected route groups only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let auth_routes = Router::new()
        .route(
            "/register-first-user",
            post(routes::auth::register_first_user),
        )
        .route("/login", post(routes::auth::login))
        .route("/google", post(routes::auth::google))
        .route("/reset-password", post(routes::auth::reset_password));

    // User routes (require JWT authentication)
    let user_routes = Router::new()
        .route("/", post(routes::users::create_user))
        .route("/", get(routes::users::list_users))
        .route("/add-existing", post(routes::users::add_existing_user))
        .route("/exists/:username", get(routes::users::user_exists))
        .route("/:id", put(routes::users::edit_user))
        .route("/:id", delete(routes::users::remove_user))
        .route("/:id/workspaces", get(routes::users::user_workspaces))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Workspace routes (require JWT authentication)
    let workspace_routes = Router::new()
        .route("/", post(routes::workspaces::create_workspace))
        .route("/switch", post(routes::workspaces::switch_workspace))
        .route("/:id", get(routes::workspaces::get_workspace))
        .route("/:id", put(routes::workspaces::edit_workspace))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Build complete v1 API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/workspaces", workspace_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Extracts and validates the bearer token from the Authorization header,
/// then injects an [`AuthContext`] into request extensions.
async fn jwt_auth_layer(
    state: axum::extract::State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, crate::error::ApiError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            crate::error::ApiError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| crate::error::ApiError::BadRequest("Expected Bearer token".to_string()))?;

    let claims = session::validate_token(token, state.jwt_secret())?;
    req.extensions_mut().insert(AuthContext::from_claims(&claims));

    Ok(next.run(req).await)
}
