//! Request and response records exchanged between gateway and backend.
//!
//! Both records travel as a single JSON document per line (see [`crate::framing`]).
//! Every field is optional on decode so that partially filled requests from
//! older gateways are defaulted rather than rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity used when a request carries no `user_id`.
pub const DEFAULT_USER_ID: &str = "anonymous";

/// Trace token used when a request carries no `request_id`.
pub const DEFAULT_REQUEST_ID: &str = "no-request-id";

/// Chunk size used when a file request asks for `limit <= 0`.
pub const DEFAULT_LIMIT: i64 = 4096;

/// Upper bound on a single file chunk (1 MiB).
pub const MAX_LIMIT: i64 = 1 << 20;

/// Kind of work a request asks the backend to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Run an allowlisted shell command.
    Cmd,
    /// Read a chunk of a file under the sandbox root.
    File,
}

impl RequestKind {
    /// Wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cmd => "cmd",
            Self::File => "file",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a `type` value the backend does not serve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type: {0}")]
pub struct UnsupportedKind(pub String);

impl FromStr for RequestKind {
    type Err = UnsupportedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "cmd" => Ok(Self::Cmd),
            "file" => Ok(Self::File),
            other => Err(UnsupportedKind(other.to_string())),
        }
    }
}

/// A single command or file-read request.
///
/// `kind` stays a raw string so an unknown type still decodes and can be
/// answered with `unsupported type` instead of `bad json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub request_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cmd: String,
    pub path: String,
    pub offset: i64,
    pub limit: i64,
}

impl Request {
    /// Build a command request.
    pub fn command(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        cmd: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            kind: RequestKind::Cmd.as_str().to_string(),
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    /// Build a file-chunk request.
    pub fn file(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        path: impl Into<String>,
        offset: i64,
        limit: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            kind: RequestKind::File.as_str().to_string(),
            path: path.into(),
            offset,
            limit,
            ..Self::default()
        }
    }

    /// Fill blank `user_id`, `request_id` and `type` with their defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.user_id.trim().is_empty() {
            self.user_id = DEFAULT_USER_ID.to_string();
        }
        if self.request_id.trim().is_empty() {
            self.request_id = DEFAULT_REQUEST_ID.to_string();
        }
        if self.kind.trim().is_empty() {
            self.kind = RequestKind::Cmd.as_str().to_string();
        }
        self
    }

    /// Parse the `type` field.
    pub fn request_kind(&self) -> Result<RequestKind, UnsupportedKind> {
        self.kind.parse()
    }

    /// Offset clamped to be non-negative.
    pub const fn clamped_offset(&self) -> i64 {
        if self.offset < 0 { 0 } else { self.offset }
    }

    /// Limit clamped to `(0, MAX_LIMIT]`, with `DEFAULT_LIMIT` for non-positive values.
    pub const fn clamped_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIMIT
        } else if self.limit > MAX_LIMIT {
            MAX_LIMIT
        } else {
            self.limit
        }
    }
}

/// Outcome of a single exchange.
///
/// Invariant: `ok == error.is_empty()`. Use [`Response::fail`] and
/// [`Response::succeed`] rather than setting the two fields by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub ok: bool,
    pub output: String,
    pub error: String,
    pub request_id: String,
    pub user_id: String,
    pub tcp_local: String,
    pub tcp_remote: String,
    pub file_b64: String,
    pub next_offset: i64,
    pub eof: bool,
}

impl Response {
    /// Base response echoing the request's trace fields.
    pub fn for_request(request: &Request) -> Self {
        Self {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            ..Self::default()
        }
    }

    /// Client-side failure that never reached (or never heard back from) the backend.
    pub fn failure(request: &Request, error: impl Into<String>) -> Self {
        Self::for_request(request).fail(error)
    }

    /// Mark this response as failed with `error`.
    #[must_use]
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        self.ok = false;
        self.error = if error.is_empty() {
            "unknown error".to_string()
        } else {
            error
        };
        self
    }

    /// Mark this response as successful.
    #[must_use]
    pub fn succeed(mut self) -> Self {
        self.ok = true;
        self.error.clear();
        self
    }

    /// Attach the dispatcher's socket endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.tcp_local = local.into();
        self.tcp_remote = remote.into();
        self
    }

    /// The error message, or `None` when the exchange succeeded.
    ///
    /// HTTP boundaries use this so "no error" is never rendered as `""`.
    pub fn error_message(&self) -> Option<&str> {
        if self.error.is_empty() {
            None
        } else {
            Some(self.error.as_str())
        }
    }
}
