//! Port definitions for collaborators outside the relay core.
//!
//! The gateway records one [`ExchangeRecord`] per relayed exchange. Where the
//! record ends up (tracing, a JSON-lines file, a database) is an adapter
//! concern; failures must never change the response already produced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{Request, RequestKind, Response};

/// Structured record of one gateway → backend exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeRecord {
    pub ts: DateTime<Utc>,
    pub request_id: String,
    pub user_id: String,
    pub kind: RequestKind,
    /// Command line for `cmd`, path for `file`.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    pub ok: bool,
    /// `None` when the exchange succeeded.
    pub error: Option<String>,
    pub tcp_local: String,
    pub tcp_remote: String,
}

impl ExchangeRecord {
    /// Build a record from the request sent and the response received.
    pub fn from_exchange(kind: RequestKind, request: &Request, response: &Response) -> Self {
        let (target, offset, limit) = match kind {
            RequestKind::Cmd => (request.cmd.clone(), None, None),
            RequestKind::File => (
                request.path.clone(),
                Some(request.offset),
                Some(request.limit),
            ),
        };
        Self {
            ts: Utc::now(),
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            kind,
            target,
            offset,
            limit,
            ok: response.ok,
            error: response.error_message().map(ToString::to_string),
            tcp_local: response.tcp_local.clone(),
            tcp_remote: response.tcp_remote.clone(),
        }
    }
}

/// Persistence failures of an exchange sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Destination for exchange records.
#[async_trait]
pub trait ExchangeLogSink: Send + Sync {
    /// Persist one record.
    async fn record(&self, record: &ExchangeRecord) -> Result<(), SinkError>;
}

/// Sink that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExchangeLog;

#[async_trait]
impl ExchangeLogSink for NoopExchangeLog {
    async fn record(&self, _record: &ExchangeRecord) -> Result<(), SinkError> {
        Ok(())
    }
}
