//! Gateway bootstrap - the composition root.
//!
//! The only place where the relay client, the exchange-log sink and the
//! admission gates are wired together.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use cmdrelay_client::RelayClient;
use cmdrelay_core::{ExchangeLogSink, ExchangeRecord, GatewayConfig, Request, RequestKind, Response};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admission::Admission;
use crate::exchange_log::{JsonlExchangeLog, TracingExchangeLog};
use crate::routes::create_router;
use crate::state::InFlight;

/// Services shared by every handler.
pub struct GatewayContext {
    pub relay: RelayClient,
    pub exchange_log: Arc<dyn ExchangeLogSink>,
    pub in_flight: InFlight,
    /// Parent of every per-request cancellation token.
    pub shutdown: CancellationToken,
}

impl GatewayContext {
    pub fn new(
        relay: RelayClient,
        exchange_log: Arc<dyn ExchangeLogSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            relay,
            exchange_log,
            in_flight: InFlight::default(),
            shutdown,
        }
    }

    /// Hand one exchange to the sink. Failures are logged and swallowed.
    pub async fn record_exchange(&self, kind: RequestKind, request: &Request, response: &Response) {
        let record = ExchangeRecord::from_exchange(kind, request, response);
        if let Err(e) = self.exchange_log.record(&record).await {
            warn!(request_id = %request.request_id, error = %e, "Failed to record exchange");
        }
    }
}

/// Build the gateway context from configuration.
pub async fn bootstrap(
    config: &GatewayConfig,
    shutdown: CancellationToken,
) -> Result<GatewayContext> {
    let exchange_log: Arc<dyn ExchangeLogSink> = match &config.exchange_log {
        Some(path) => {
            let sink = JsonlExchangeLog::open(path)
                .await
                .with_context(|| format!("Failed to open exchange log {}", path.display()))?;
            info!(path = %sink.path().display(), "Recording exchanges to JSON lines file");
            Arc::new(sink)
        }
        None => Arc::new(TracingExchangeLog),
    };

    Ok(GatewayContext::new(
        RelayClient::new(config.relay.clone()),
        exchange_log,
        shutdown,
    ))
}

/// Run the gateway until `shutdown` fires.
///
/// Cancelling `shutdown` stops accepting connections, stops the rate-limit
/// eviction task and cancels relay calls still in progress.
pub async fn start_gateway(config: GatewayConfig, shutdown: CancellationToken) -> Result<()> {
    let ctx = Arc::new(bootstrap(&config, shutdown.clone()).await?);

    let admission = Admission::from_config(&config.admission);
    let eviction = admission
        .limiter
        .is_enabled()
        .then(|| admission.limiter.spawn_eviction(shutdown.clone()));

    let app = create_router(ctx, &admission, config.request_timeout);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    info!(
        addr = %listener.local_addr()?,
        backend = %config.relay.address(),
        max_concurrency = config.admission.max_concurrency,
        rate_rps = config.admission.rate_rps,
        rate_burst = config.admission.rate_burst,
        "Gateway listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("Gateway server error")?;

    if let Some(handle) = eviction {
        let _ = handle.await;
    }
    info!("Gateway stopped");
    Ok(())
}
