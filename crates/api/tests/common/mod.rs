//! Shared helpers for API integration tests.
//!
//! Mirrors the production router construction so tests exercise the same
//! middleware stack (CORS, request ID, timeout, tracing, panic recovery).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use sqlx::PgPool;
use tower::ServiceExt;

use mindgraph_api::auth::jwt::{generate_access_token, JwtConfig};
use mindgraph_api::config::ServerConfig;
use mindgraph_api::router::build_app_router;
use mindgraph_api::state::AppState;
use mindgraph_core::types::DbId;
use mindgraph_db::models::document::Document;
use mindgraph_db::repositories::{DocumentRepo, UserRepo};

/// Build a test `ServerConfig` with a fixed JWT secret and safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Build the full application router with all middleware layers.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Mint a bearer token for the given user/org.
pub fn token_for(user_id: DbId, org_id: DbId) -> String {
    generate_access_token(user_id, org_id, &test_config().jwt)
        .expect("token generation should succeed")
}

/// A seeded org with two users and one document.
pub struct Seed {
    pub org_id: DbId,
    pub alice: DbId,
    pub bob: DbId,
    pub doc: Document,
}

pub async fn seed(pool: &PgPool) -> Seed {
    let org_id = UserRepo::create_org(pool, "acme").await.unwrap();
    let alice = UserRepo::create(pool, org_id, "Alice", "alice@acme.test")
        .await
        .unwrap()
        .id;
    let bob = UserRepo::create(pool, org_id, "Bob", "bob@acme.test")
        .await
        .unwrap()
        .id;
    let doc = DocumentRepo::create(pool, org_id, "Roadmap", &serde_json::json!({"nodes": []}))
        .await
        .unwrap();
    Seed {
        org_id,
        alice,
        bob,
        doc,
    }
}

/// Issue a GET without authentication.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Issue an authenticated request with an optional JSON body.
pub async fn request(
    app: Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a response has the given status and return its JSON body.
pub async fn expect_status(
    response: Response<Body>,
    status: StatusCode,
) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
