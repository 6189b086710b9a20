//! Liveness and in-flight gauge.

use axum::extract::State;

use crate::state::AppState;

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /metrics`: relay-invoking requests currently in progress.
pub async fn metrics(State(state): State<AppState>) -> String {
    format!("in_flight {}\n", state.in_flight.current())
}
