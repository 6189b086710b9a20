//! Response-format negotiation (JSON or YAML).

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::HttpError;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const YAML_CONTENT_TYPE: &str = "application/x-yaml; charset=utf-8";

/// Media types that select YAML, in `Accept` or `Content-Type`.
pub const YAML_MEDIA_TYPES: [&str; 2] = ["application/x-yaml", "text/yaml"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Json,
    Yaml,
}

impl ResponseFormat {
    /// `?format=yaml` wins; otherwise an `Accept` header naming a YAML type.
    pub fn negotiate(format_param: Option<&str>, headers: &HeaderMap) -> Self {
        if format_param.is_some_and(|f| f.trim().eq_ignore_ascii_case("yaml")) {
            return Self::Yaml;
        }

        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if YAML_MEDIA_TYPES.iter().any(|t| accept.contains(t)) {
            Self::Yaml
        } else {
            Self::Json
        }
    }

    /// Serialize `value` with a `200 OK` status.
    pub fn render<T: Serialize>(self, value: &T) -> Result<Response, HttpError> {
        let (body, content_type) = match self {
            Self::Json => {
                let mut body = serde_json::to_vec(value)
                    .map_err(|e| HttpError::Internal(e.to_string()))?;
                body.push(b'\n');
                (body, JSON_CONTENT_TYPE)
            }
            Self::Yaml => {
                let body = serde_yaml::to_string(value)
                    .map_err(|e| HttpError::Internal(e.to_string()))?;
                (body.into_bytes(), YAML_CONTENT_TYPE)
            }
        };

        let headers = [(header::CONTENT_TYPE, content_type)];
        Ok((StatusCode::OK, headers, body).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;

    #[derive(Serialize)]
    struct Sample {
        ok: bool,
        output: String,
    }

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_negotiate() {
        let none = HeaderMap::new();
        assert_eq!(ResponseFormat::negotiate(None, &none), ResponseFormat::Json);
        assert_eq!(
            ResponseFormat::negotiate(Some(" YAML "), &none),
            ResponseFormat::Yaml
        );
        assert_eq!(
            ResponseFormat::negotiate(Some("json"), &none),
            ResponseFormat::Json
        );
        assert_eq!(
            ResponseFormat::negotiate(None, &accept("text/yaml")),
            ResponseFormat::Yaml
        );
        assert_eq!(
            ResponseFormat::negotiate(None, &accept("text/html, application/x-yaml;q=0.9")),
            ResponseFormat::Yaml
        );
        assert_eq!(
            ResponseFormat::negotiate(None, &accept("application/json")),
            ResponseFormat::Json
        );
    }

    #[tokio::test]
    async fn test_render_yaml() {
        let value = Sample {
            ok: true,
            output: "Linux".to_string(),
        };
        let response = ResponseFormat::Yaml.render(&value).unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-yaml; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("ok: true"));
        assert!(text.contains("output: Linux"));
    }

    #[tokio::test]
    async fn test_render_json() {
        let value = Sample {
            ok: false,
            output: String::new(),
        };
        let response = ResponseFormat::Json.render(&value).unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], false);
    }
}
