//! HTTP request handlers for the gateway.
//!
//! `run` and `file` build one backend request each and hand it to the relay
//! client; `health` serves liveness and the in-flight gauge.

pub mod file;
pub mod health;
pub mod run;

use axum::http::HeaderMap;
use cmdrelay_core::DEFAULT_USER_ID;
use uuid::Uuid;

/// Header carrying the caller-supplied identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity from `X-User-Id`, or `anonymous`.
pub fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
}

/// Fresh trace id for one backend exchange.
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_defaults_to_anonymous() {
        assert_eq!(user_id(&HeaderMap::new()), "anonymous");

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(user_id(&headers), "anonymous");

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" alice "));
        assert_eq!(user_id(&headers), "alice");
    }

    #[test]
    fn test_request_ids_are_unique_hex() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
