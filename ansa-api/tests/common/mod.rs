/// Common test utilities for API integration tests
///
/// Each test context owns a uniquely-named database created from the
/// `DATABASE_URL` base and a router built over it. Tests skip when
/// `DATABASE_URL` is unset.
use ansa_api::app::{build_router, AppState};
use ansa_api::config::{ApiConfig, Config, DatabaseConfig, JwtConfig};
use ansa_core::db::migrations;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use sqlx::PgPool;
use tower::Service as _;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    url: String,
}

impl TestContext {
    /// Creates a fresh database and router, or `None` when `DATABASE_URL`
    /// is unset
    pub async fn try_new() -> Option<Self> {
        let base_url = std::env::var("DATABASE_URL").ok()?;

        let (server, _) = base_url
            .rsplit_once('/')
            .expect("DATABASE_URL must contain a database path");
        let url = format!("{}/ansa_api_test_{}", server, Uuid::new_v4().simple());

        migrations::ensure_database_exists(&url)
            .await
            .expect("Failed to create test database");
        let db = PgPool::connect(&url)
            .await
            .expect("Failed to connect to test database");
        migrations::run_migrations(&db)
            .await
            .expect("Failed to run migrations");

        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
            },
            database: DatabaseConfig {
                url: url.clone(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: JWT_SECRET.to_string(),
            },
        };

        let state = AppState::new(db.clone(), config);
        let app = build_router(state);

        Some(Self { db, app, url })
    }

    /// Sends a JSON request and returns status plus parsed body
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }

    /// Bootstraps a first user and returns their login token
    pub async fn bootstrap_and_login(&self, username: &str, password: &str) -> String {
        let (status, _) = self
            .request(
                "POST",
                "/v1/auth/register-first-user",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "Bootstrap should succeed");

        self.login(username, password).await
    }

    /// Logs in and returns the session token
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/v1/auth/login",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "Login should succeed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Drops the per-test database
    pub async fn teardown(self) {
        self.db.close().await;
        migrations::drop_database(&self.url)
            .await
            .expect("Failed to drop test database");
    }
}
