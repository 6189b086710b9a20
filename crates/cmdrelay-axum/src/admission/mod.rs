//! Admission control for relay-invoking routes.
//!
//! Two independent gates, applied as middleware with the rate limiter
//! outermost:
//!
//! ```text
//! request -> rate_limit (per client IP) -> limit_concurrency (global) -> handler
//! ```
//!
//! Both reject immediately with `429 Too Many Requests`; nothing is queued.

mod concurrency;
mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use cmdrelay_core::AdmissionConfig;
use tracing::debug;

use crate::error::HttpError;

pub use concurrency::{ConcurrencyGate, GatePermit};
pub use rate_limit::RateLimiter;

/// Header set by proxies in front of the gateway.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Both admission gates, built from one config.
#[derive(Debug, Clone)]
pub struct Admission {
    pub gate: ConcurrencyGate,
    pub limiter: Arc<RateLimiter>,
}

impl Admission {
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            gate: ConcurrencyGate::new(config.max_concurrency),
            limiter: Arc::new(RateLimiter::new(config)),
        }
    }
}

/// Identify the caller: first `X-Forwarded-For` entry, else the peer IP.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Per-IP token bucket middleware.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);

    if !limiter.check(&ip) {
        debug!(client = %ip, path = %req.uri().path(), "Rate limit exceeded");
        return Err(HttpError::TooManyRequests);
    }
    Ok(next.run(req).await)
}

/// Global in-flight cap middleware. The slot is held until the inner
/// response is produced, and released on every exit path.
pub async fn limit_concurrency(
    State(gate): State<ConcurrencyGate>,
    req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let Some(_permit) = gate.try_acquire() else {
        debug!(path = %req.uri().path(), "Concurrency limit reached");
        return Err(HttpError::TooManyRequests);
    };
    Ok(next.run(req).await)
}
