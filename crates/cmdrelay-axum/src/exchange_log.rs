//! Exchange-log sinks.
//!
//! Every relayed exchange produces one [`ExchangeRecord`]. Sinks may fail;
//! the handler logs the failure and still returns the relay response.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cmdrelay_core::{ExchangeLogSink, ExchangeRecord, SinkError};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Emits each record as a structured `info!` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExchangeLog;

#[async_trait]
impl ExchangeLogSink for TracingExchangeLog {
    async fn record(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        info!(
            target: "cmdrelay::exchange",
            request_id = %record.request_id,
            user_id = %record.user_id,
            kind = %record.kind,
            subject = %record.target,
            offset = ?record.offset,
            limit = ?record.limit,
            ok = record.ok,
            error = record.error.as_deref().unwrap_or(""),
            tcp_local = %record.tcp_local,
            tcp_remote = %record.tcp_remote,
            "exchange"
        );
        Ok(())
    }
}

/// Appends each record as one JSON line to a file.
#[derive(Debug)]
pub struct JsonlExchangeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlExchangeLog {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SinkError::Storage(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExchangeLogSink for JsonlExchangeLog {
    async fn record(&self, record: &ExchangeRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| SinkError::Serialization(e.to_string()))?;
        line.push(b'\n');

        // One writer at a time keeps lines from interleaving.
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| SinkError::Storage(e.to_string()))
    }
}
