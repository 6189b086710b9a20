//! Relay client for the cmdrelay backend.
//!
//! Each call dials a fresh connection, writes one request frame, reads one
//! response frame and drops the connection. Nothing is pooled or retried.
//! Every failure is folded into an in-band `Response { ok: false, .. }`.

#![deny(unsafe_code)]

use std::time::Duration;

use cmdrelay_core::{ProtocolError, RelayConfig, Request, Response, decode, read_frame, write_frame};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ways a relay exchange can fail.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("request canceled")]
    Canceled,

    #[error("dial {address}: timed out after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },

    #[error("dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o deadline of {0:?} exceeded")]
    Deadline(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client for one-shot exchanges with the backend.
#[derive(Debug, Clone)]
pub struct RelayClient {
    config: RelayConfig,
}

impl RelayClient {
    pub const fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Perform one exchange. Never fails: errors become a failure response
    /// that keeps the request's `request_id` and `user_id`.
    pub async fn call(&self, cancel: &CancellationToken, request: &Request) -> Response {
        match self.try_call(cancel, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    backend = %self.config.address(),
                    error = %e,
                    "Relay call failed"
                );
                Response::failure(request, e.to_string())
            }
        }
    }

    /// Perform one exchange, surfacing the failure cause.
    ///
    /// The dial is bounded by `dial_timeout`; the write and the read share a
    /// single `io_timeout` deadline. `cancel` aborts either phase.
    pub async fn try_call(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, RelayError> {
        let stream = self.dial(cancel).await?;
        let deadline = self.config.io_timeout;

        let exchange = async {
            let mut stream = BufReader::new(stream);
            write_frame(&mut stream, request).await?;
            // Command output is unbounded; the I/O deadline bounds the read.
            let line = read_frame(&mut stream, usize::MAX).await?;
            decode::<Response>(&line)
        };

        // The stream lives inside `exchange`; it is dropped (closed) on every path.
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RelayError::Canceled),
            result = tokio::time::timeout(deadline, exchange) => match result {
                Ok(result) => result?,
                Err(_) => return Err(RelayError::Deadline(deadline)),
            },
        };

        debug!(
            request_id = %request.request_id,
            ok = response.ok,
            tcp_local = %response.tcp_local,
            tcp_remote = %response.tcp_remote,
            "Relay call completed"
        );
        Ok(response)
    }

    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream, RelayError> {
        let address = self.config.address();
        let timeout = self.config.dial_timeout;

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RelayError::Canceled),
            dialed = tokio::time::timeout(timeout, TcpStream::connect(address.as_str())) => {
                match dialed {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(source)) => Err(RelayError::Dial { address, source }),
                    Err(_) => Err(RelayError::DialTimeout { address, timeout }),
                }
            }
        }
    }
}
