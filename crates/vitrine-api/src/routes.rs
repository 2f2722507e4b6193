//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use vitrine_core::config::VitrineConfig;
use vitrine_core::error::VitrineError;

use crate::handlers;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Default listen port when the config leaves it unset.
const DEFAULT_PORT: u16 = 3030;

fn effective_port(config: &VitrineConfig) -> u16 {
    match config.api.port {
        0 => DEFAULT_PORT,
        port => port,
    }
}

/// Create the axum Router with all routes and middleware.
///
/// # Arguments
/// * `state` - The shared application state.
///
/// # Returns
/// A fully configured axum Router ready to serve requests.
pub fn create_router(state: AppState) -> Router {
    // CORS middleware: allow localhost origins for console access.
    // Use the configured port (from CLI/env/config) plus port+1 for dev server.
    let port = effective_port(&state.config);
    let dev_port = port.saturating_add(1);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            format!("http://127.0.0.1:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://127.0.0.1:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Routes that do NOT require authentication.
    let public_routes = Router::new().route("/health", get(handlers::health));

    // Rate limiter on the inbound chat endpoints only.
    let limiter = RateLimiter::new(state.config.api.max_requests_per_sec);

    let chat_routes = Router::new()
        .route(
            "/chat/{chat_id}/message",
            post(handlers::chat_message).layer(DefaultBodyLimit::max(16 * 1024)), // 16KB for messages
        )
        .route("/chat/{chat_id}/control", post(handlers::chat_control))
        .layer(axum::middleware::from_fn(
            crate::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter));

    // Read-only lookups, not rate limited.
    let query_routes = Router::new()
        .route("/search", get(handlers::search_preview))
        .route("/catalog/{position}", get(handlers::catalog_item));

    // SSE streams exempt from rate limiting.
    let stream_routes = Router::new()
        .route("/chat/outbox", get(handlers::outbox))
        .route("/events", get(handlers::events));

    // Combine all protected routes behind auth.
    let protected_routes = chat_routes
        .merge(query_routes)
        .merge(stream_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB global limit
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
pub async fn start_server(config: &VitrineConfig, state: AppState) -> Result<(), VitrineError> {
    let addr = format!("{}:{}", config.api.bind, effective_port(config));

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| VitrineError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| VitrineError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
