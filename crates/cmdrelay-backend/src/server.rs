//! TCP accept loop for the backend.
//!
//! Binds first so the real address is known before serving, then spawns one
//! task per accepted connection until the cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cmdrelay_core::BackendConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors from starting the backend listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A bound backend listener, ready to serve.
pub struct BackendServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
}

impl BackendServer {
    /// Bind the configured listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address cannot be bound.
    pub async fn bind(config: &BackendConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: config.listen_addr.to_string(),
                reason: e.to_string(),
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(format!("Failed to get local address: {e}")))?;

        info!(
            addr = %local_addr,
            root = %config.file_root.display(),
            allowed = config.allowed_commands.len(),
            "Backend bound"
        );

        Ok(Self {
            listener,
            local_addr,
            dispatcher: Arc::new(Dispatcher::from_config(config)),
        })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `cancel` fires.
    ///
    /// Connections already accepted keep running to completion on their own
    /// tasks; only the accept loop stops.
    pub async fn serve(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(addr = %self.local_addr, "Backend shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(async move {
                            dispatcher.handle_connection(stream).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }
}
