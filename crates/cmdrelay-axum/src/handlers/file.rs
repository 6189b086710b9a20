//! `/file`: relay one sandboxed file-chunk read to the backend.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use cmdrelay_core::{DEFAULT_LIMIT, Request as RelayRequest, RequestKind};
use serde::{Deserialize, Serialize};

use super::{new_request_id, user_id};
use crate::error::HttpError;
use crate::respond::ResponseFormat;
use crate::state::AppState;

/// Query string accepted on `/file`.
///
/// Numbers stay strings so unparsable values fall back to defaults instead
/// of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct FileParams {
    pub path: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
    pub format: Option<String>,
}

/// Body returned by `/file`.
#[derive(Debug, Serialize)]
pub struct FileReadResult {
    pub request_id: String,
    pub user_id: String,
    pub path: String,
    pub offset: i64,
    pub limit: i64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file_b64: String,
    pub next_offset: i64,
    pub eof: bool,
}

/// Non-negative integer offset, else 0.
fn parse_offset(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}

/// Positive integer limit, else the default chunk size.
fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LIMIT)
}

/// Read a file chunk: `GET /file?path=..&offset=..&limit=..`.
pub async fn read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FileParams>,
) -> Result<Response, HttpError> {
    let _in_flight = state.in_flight.enter();
    let format = ResponseFormat::negotiate(params.format.as_deref(), &headers);

    let path = params.path.as_deref().map(str::trim).unwrap_or_default();
    if path.is_empty() {
        return Err(HttpError::BadRequest("path required".to_string()));
    }
    let offset = parse_offset(params.offset.as_deref());
    let limit = parse_limit(params.limit.as_deref());

    let request = RelayRequest::file(new_request_id(), user_id(&headers), path, offset, limit);
    let cancel = state.shutdown.child_token();
    let response = state.relay.call(&cancel, &request).await;
    state
        .record_exchange(RequestKind::File, &request, &response)
        .await;

    let error = response.error_message().map(ToString::to_string);
    format.render(&FileReadResult {
        request_id: request.request_id,
        user_id: request.user_id,
        path: request.path,
        offset,
        limit,
        ok: response.ok,
        error,
        file_b64: response.file_b64,
        next_offset: response.next_offset,
        eof: response.eof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset(None), 0);
        assert_eq!(parse_offset(Some("")), 0);
        assert_eq!(parse_offset(Some("abc")), 0);
        assert_eq!(parse_offset(Some("-5")), 0);
        assert_eq!(parse_offset(Some(" 42 ")), 42);
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), 4096);
        assert_eq!(parse_limit(Some("0")), 4096);
        assert_eq!(parse_limit(Some("-1")), 4096);
        assert_eq!(parse_limit(Some("1.5")), 4096);
        assert_eq!(parse_limit(Some("10")), 10);
    }
}
