//! Admin REST API server module
//!
//! Authenticated CRUD over the series registry plus operational endpoints:
//! force-scan, retry, domain migration, stats, the SSE event stream, and a
//! liveness probe. JSON in and out, wrapped in the
//! `{success, data?/error}` envelope.

use crate::config::Config;
use crate::service::MirrorService;
use crate::{Error, Result};
use axum::{
    Router,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Series Registry
/// - `POST /series` - Register a series (schedules an immediate first scan)
/// - `GET /series` - List series with status/title filters and pagination
/// - `POST /series/bulk` - Bulk register; duplicates are skipped, never 409
/// - `PUT /series/update-domain` - Migrate source hostnames (dry-run aware)
/// - `GET /series/:id` - Series detail with sources and failed tasks
/// - `PUT /series/:id` - Partial update
/// - `DELETE /series/:id` - Delete (cascades to sources and tasks)
/// - `POST /series/:id/force-scan` - Schedule an immediate scan
/// - `POST /series/:id/retry` - Flip failed tasks back to pending
///
/// ## System
/// - `GET /stats` - Aggregate series/task status counts
/// - `GET /health` - Liveness (unauthenticated)
/// - `GET /events` - Server-sent events stream
/// - `POST /events/token` - Mint a capability token for the event bus
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
pub fn create_router(service: Arc<MirrorService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    let router = Router::new()
        // Series registry
        .route("/series", post(routes::create_series))
        .route("/series", get(routes::list_series))
        .route("/series/bulk", post(routes::bulk_create_series))
        .route("/series/update-domain", put(routes::update_domain))
        .route("/series/:id", get(routes::get_series))
        .route("/series/:id", put(routes::update_series))
        .route("/series/:id", delete(routes::delete_series))
        .route("/series/:id/force-scan", post(routes::force_scan))
        .route("/series/:id/retry", post(routes::retry_failed))
        // System
        .route("/stats", get(routes::stats))
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .route("/events/token", post(routes::mint_event_token))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Apply authentication middleware if an admin key is configured; the
    // liveness endpoint stays reachable without credentials
    let router = if config.api.admin_api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.admin_api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    // CORS from any origin; operator UIs live elsewhere
    if config.api.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Start the API server on the configured bind address.
///
/// Binds a TCP listener and serves the router until shutdown.
pub async fn start_api_server(service: Arc<MirrorService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(service, config);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
