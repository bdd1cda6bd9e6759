#![doc = include_str!("../README.md")]

mod config;
mod error;
mod orchestrator;
mod routes;
mod telemetry;

use clap::Parser;
use config::{CliArgs, GatewayConfig};
use routes::{AppState, router};
use telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;
use tonic::{codec::CompressionEncoding, transport::Endpoint};
use userhub_core::proto::users_service_client::UsersServiceClient;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = GatewayConfig::try_from(args)?;

    init_telemetry()?;

    // Connected on first use, so the gateway can start before the auth
    // service.
    let channel = Endpoint::from_shared(config.auth_addr.clone())?.connect_lazy();
    let client = UsersServiceClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        "Gateway listening on {} and forwarding to {}",
        listener.local_addr()?,
        config.auth_addr
    );

    let shutdown_timeout = config.shutdown_timeout;
    let state = AppState::new(client, config);
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Background query sessions outlive their HTTP requests.
    state.runs().shutdown(shutdown_timeout).await;

    tracing::info!("Gateway shut down successfully");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
