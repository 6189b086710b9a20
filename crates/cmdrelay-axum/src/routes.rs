//! Route definitions and router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{any, get};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admission::{self, Admission};
use crate::handlers;
use crate::state::AppState;

/// Largest accepted request body (1 MiB).
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Routes that call the backend, behind admission control.
///
/// `route_layer` runs only for matched routes, so unknown paths are never
/// counted against a client's rate limit. The last layer added is the
/// outermost: the rate limiter sees a request before the concurrency gate.
fn relay_routes(admission: &Admission, request_timeout: Duration) -> Router<AppState> {
    Router::new()
        .route("/run", any(handlers::run::run))
        .route("/file", get(handlers::file::read))
        .route_layer(middleware::from_fn_with_state(
            admission.gate.clone(),
            admission::limit_concurrency,
        ))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&admission.limiter),
            admission::rate_limit,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

/// Build the gateway router.
pub fn create_router(state: AppState, admission: &Admission, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route("/metrics", get(handlers::health::metrics))
        .merge(relay_routes(admission, request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
