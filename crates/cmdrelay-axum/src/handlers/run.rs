//! `/run`: relay one allowlisted command to the backend.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Form, FromRequest, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::Response;
use cmdrelay_core::{Request as RelayRequest, RequestKind};
use serde::{Deserialize, Serialize};

use super::{new_request_id, user_id};
use crate::error::HttpError;
use crate::respond::{ResponseFormat, YAML_MEDIA_TYPES};
use crate::state::AppState;

/// Query string accepted on `/run`.
#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    pub cmd: Option<String>,
    pub format: Option<String>,
}

/// Body accepted on `POST /run` (JSON, YAML or form). Other fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunBody {
    pub cmd: String,
}

/// Body returned by `/run`.
#[derive(Debug, Serialize)]
pub struct CommandResult {
    pub ok: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
    pub user_id: String,
    pub tcp_local: String,
    pub tcp_remote: String,
}

impl From<cmdrelay_core::Response> for CommandResult {
    fn from(res: cmdrelay_core::Response) -> Self {
        let error = res.error_message().map(ToString::to_string);
        Self {
            ok: res.ok,
            output: res.output,
            error,
            request_id: res.request_id,
            user_id: res.user_id,
            tcp_local: res.tcp_local,
            tcp_remote: res.tcp_remote,
        }
    }
}

/// Run a command: `GET /run?cmd=..` or `POST /run` with a body.
pub async fn run(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<RunParams>,
    req: Request,
) -> Result<Response, HttpError> {
    let _in_flight = state.in_flight.enter();
    let format = ResponseFormat::negotiate(params.format.as_deref(), &headers);

    let cmd = match method {
        Method::GET => params.cmd.unwrap_or_default(),
        Method::POST => command_from_body(req).await?,
        _ => return Err(HttpError::MethodNotAllowed),
    };

    let cmd = cmd.trim();
    if cmd.is_empty() {
        return Err(HttpError::BadRequest("cmd required".to_string()));
    }

    let request = RelayRequest::command(new_request_id(), user_id(&headers), cmd);
    let cancel = state.shutdown.child_token();
    let response = state.relay.call(&cancel, &request).await;
    state
        .record_exchange(RequestKind::Cmd, &request, &response)
        .await;

    format.render(&CommandResult::from(response))
}

/// Pull `cmd` out of a POST body according to its content type.
async fn command_from_body(req: Request) -> Result<String, HttpError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let Json(body) = Json::<RunBody>::from_request(req, &())
            .await
            .map_err(|e| body_error(e.status(), "json"))?;
        Ok(body.cmd)
    } else if YAML_MEDIA_TYPES.iter().any(|t| content_type.starts_with(t)) {
        let bytes = Bytes::from_request(req, &())
            .await
            .map_err(|e| body_error(e.status(), "yaml"))?;
        let body: RunBody = serde_yaml::from_slice(&bytes)
            .map_err(|_| HttpError::BadRequest("invalid yaml".to_string()))?;
        Ok(body.cmd)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(body) = Form::<RunBody>::from_request(req, &())
            .await
            .map_err(|e| body_error(e.status(), "form"))?;
        Ok(body.cmd)
    } else {
        Err(HttpError::UnsupportedMediaType(
            "unsupported content-type".to_string(),
        ))
    }
}

fn body_error(status: StatusCode, format: &str) -> HttpError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        HttpError::PayloadTooLarge
    } else {
        HttpError::BadRequest(format!("invalid {format}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_omits_empty_error() {
        let ok = cmdrelay_core::Response {
            ok: true,
            output: "Linux\n".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(CommandResult::from(ok)).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["output"], "Linux\n");

        let failed = cmdrelay_core::Response::default().fail("command not allowed");
        let json = serde_json::to_value(CommandResult::from(failed)).unwrap();
        assert_eq!(json["error"], "command not allowed");
        assert_eq!(json["ok"], false);
    }

    #[test]
    fn test_body_error_mapping() {
        assert!(matches!(
            body_error(StatusCode::PAYLOAD_TOO_LARGE, "json"),
            HttpError::PayloadTooLarge
        ));
        match body_error(StatusCode::UNPROCESSABLE_ENTITY, "json") {
            HttpError::BadRequest(msg) => assert_eq!(msg, "invalid json"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
