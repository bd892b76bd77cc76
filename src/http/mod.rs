//! The Axum HTTP surface: routing, shared state, and error translation.

pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;

use crate::cache::IsolateCache;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub cache: Arc<IsolateCache>,
}

/// Build the full router: routes plus a per-request tracing span.
pub fn router(pool: SqlitePool) -> Router {
    let state = AppState {
        pool,
        cache: Arc::new(IsolateCache::new()),
    };

    Router::new()
        .route("/", get(handlers::root))
        .route("/invoke", post(handlers::invoke_source))
        .route(
            "/functions",
            get(handlers::list_functions).post(handlers::create_function),
        )
        .route("/functions/:id", get(handlers::get_function))
        .route(
            "/functions/:id/deployments",
            post(handlers::create_deployment),
        )
        .route(
            "/functions/:id/invocations",
            post(handlers::invoke_function),
        )
        .layer(middleware::from_fn(record_request))
        .with_state(state)
}

/// Logs method, path, status, and latency for every request, the way the
/// teacher's binary reports its own top-level actions through `tracing`.
async fn record_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = latency.as_secs_f64() * 1000.0,
        "request handled"
    );

    response
}
