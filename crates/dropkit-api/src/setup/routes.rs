//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::auth::middleware::AuthState;
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::{delete, get, head, options, post},
    Json, Router,
};
use dropkit_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;
    let auth_state = Arc::new(AuthState::new(&config.jwt_secret));

    // Public routes: health, docs, the content gate (secret-gated, not
    // owner-gated), metadata for viewers, and tus capability discovery.
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/openapi.json", get(openapi_json))
        .route(
            "/api/v0/uploads/{id}/info",
            get(handlers::uploads::get_upload_info),
        )
        .route(
            "/api/v0/uploads/{id}/content",
            get(handlers::content::get_content),
        )
        .route("/api/v0/files", options(handlers::resumable::tus_options));

    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route(
            "/api/v0/uploads",
            post(handlers::uploads::create_upload).get(handlers::uploads::list_uploads),
        )
        .route("/api/v0/uploads/usage", get(handlers::uploads::get_usage))
        .route(
            "/api/v0/uploads/{id}",
            delete(handlers::uploads::delete_upload),
        )
        .route(
            "/api/v0/uploads/{id}/transfer",
            post(handlers::uploads::transfer),
        )
        .route(
            "/api/v0/files/{id}",
            head(handlers::resumable::tus_head)
                .patch(handlers::resumable::tus_patch)
                .delete(handlers::resumable::tus_delete),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::auth::middleware::auth_middleware,
        ));

    // Server-level concurrency limit to protect against resource exhaustion
    // under extreme load
    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);

    let app = public_routes
        .merge(protected_routes)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(config.max_patch_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    // PATCH/HEAD for the resumable protocol; tus headers must be readable
    // cross-origin for resume to work.
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::HEAD,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins.contains(&"*".to_string()) {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
            .expose_headers(Any)
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            config.cors_origins.iter().map(|o| o.parse()).collect();

        CorsLayer::new()
            .allow_origin(origins.unwrap_or_default())
            .allow_methods(methods)
            .allow_headers(Any)
            .expose_headers(Any)
    };
    Ok(cors)
}
