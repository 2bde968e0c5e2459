//! Router-level tests for the HTTP surface: auth gating, input validation,
//! and the resumable protocol's capability discovery. Paths that need a live
//! Postgres are exercised against the repositories' SQL elsewhere; these
//! tests run against a lazy pool that is never touched.

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use dropkit_api::auth::models::JwtClaims;
use dropkit_api::setup::routes::setup_routes;
use dropkit_api::state::{AppState, DbState};
use dropkit_core::{Config, StorageBackend};
use dropkit_db::{DeletionOutboxRepository, UploadRepository};
use dropkit_storage::LocalStorage;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const JWT_SECRET: &str = "test-jwt-secret";

fn test_config(storage_path: &str) -> Config {
    Config {
        server_port: 0,
        cors_origins: vec!["*".to_string()],
        environment: "test".to_string(),
        database_url: "postgres://localhost/dropkit_test".to_string(),
        db_max_connections: 2,
        db_timeout_seconds: 5,
        jwt_secret: JWT_SECRET.to_string(),
        storage_backend: StorageBackend::Local,
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        local_storage_path: Some(storage_path.to_string()),
        local_storage_base_url: Some("http://localhost:4000/files".to_string()),
        max_patch_body_bytes: 64 * 1024 * 1024,
        worker_poll_interval_ms: 1000,
        worker_max_delete_attempts: 8,
        expired_retention_hours: 24,
    }
}

async fn test_server(dir: &tempfile::TempDir) -> TestServer {
    let config = test_config(dir.path().to_str().unwrap());

    // Lazy pool: connections are only established on first use, which these
    // tests never trigger.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");

    let storage = Arc::new(
        LocalStorage::new(dir.path(), config.local_storage_base_url.clone().unwrap())
            .await
            .expect("local storage"),
    );

    let state = Arc::new(AppState {
        db: DbState {
            pool: pool.clone(),
            uploads: UploadRepository::new(pool.clone()),
            outbox: DeletionOutboxRepository::new(pool),
        },
        storage,
        config: config.clone(),
        is_production: false,
        worker: None,
    });

    let router = setup_routes(&config, state).expect("router");
    TestServer::new(router).expect("test server")
}

fn bearer(user_id: Uuid) -> HeaderValue {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn auth_header() -> HeaderName {
    HeaderName::from_static("authorization")
}

#[tokio::test]
async fn health_is_public() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server.get("/api/openapi.json").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let doc: serde_json::Value = response.json();
    assert!(doc.get("paths").is_some());
}

#[tokio::test]
async fn create_requires_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server
        .post("/api/v0/uploads")
        .json(&json!({
            "file_name": "a.png",
            "extension": "png",
            "size": 1024,
            "content_type": "image/png"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bearer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server
        .get("/api/v0/uploads")
        .add_header(auth_header(), HeaderValue::from_static("Bearer not-a-jwt"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_rejects_zero_size() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server
        .post("/api/v0/uploads")
        .add_header(auth_header(), bearer(Uuid::new_v4()))
        .json(&json!({
            "file_name": "a.png",
            "extension": "png",
            "size": 0,
            "content_type": "image/png"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_rejects_past_expiration() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let yesterday = Utc::now() - Duration::days(1);
    let response = server
        .post("/api/v0/uploads")
        .add_header(auth_header(), bearer(Uuid::new_v4()))
        .json(&json!({
            "file_name": "a.png",
            "extension": "png",
            "size": 1024,
            "content_type": "image/png",
            "expiration": yesterday
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_rejects_short_secret() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server
        .post("/api/v0/uploads")
        .add_header(auth_header(), bearer(Uuid::new_v4()))
        .json(&json!({
            "file_name": "a.png",
            "extension": "png",
            "size": 1024,
            "content_type": "image/png",
            "secret": "abc"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_rejects_missing_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server
        .post("/api/v0/uploads")
        .add_header(auth_header(), bearer(Uuid::new_v4()))
        .json(&json!({
            "file_name": "a.png",
            "extension": "png",
            "size": 1024,
            "content_type": ""
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tus_options_advertises_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let response = server.method(Method::OPTIONS, "/api/v0/files").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let headers = response.headers();
    assert_eq!(
        headers.get("Tus-Resumable").and_then(|v| v.to_str().ok()),
        Some("1.0.0")
    );
    assert_eq!(
        headers.get("Tus-Extension").and_then(|v| v.to_str().ok()),
        Some("termination")
    );
}

#[tokio::test]
async fn resumable_endpoints_require_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir).await;

    let id = Uuid::new_v4();
    let response = server
        .method(Method::HEAD, &format!("/api/v0/files/{}", id))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server.delete(&format!("/api/v0/files/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
