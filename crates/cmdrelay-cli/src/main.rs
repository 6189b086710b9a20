//! CLI entry point - the composition root.
//!
//! `cmdrelay backend` runs the TCP execution backend, `cmdrelay gateway` the
//! HTTP gateway. Both stop gracefully on Ctrl-C.

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cmdrelay_axum::start_gateway;
use cmdrelay_backend::BackendServer;
use cmdrelay_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());

    match cli.command {
        Commands::Backend(args) => {
            let config = args.to_config();
            let server = BackendServer::bind(&config)
                .await
                .context("Failed to start backend")?;
            info!(addr = %server.local_addr(), "Backend listening");
            server.serve(shutdown).await;
        }
        Commands::Gateway(args) => {
            start_gateway(args.to_config(), shutdown).await?;
        }
    }

    Ok(())
}

fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
