#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::AuthService;
use server::store::UserStore;
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal;
use tonic::codec::CompressionEncoding;
use tonic::transport::{Server, server::Connected};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use userhub_core::proto::{FILE_DESCRIPTOR_SET, users_service_server::UsersServiceServer};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type UsersServer = UsersServiceServer<AuthService>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let config = ServerConfig::try_from(CliArgs::parse())?;
    let providers = init_telemetry()?;

    let store = Arc::new(UserStore::seeded(config.seed_users));
    #[cfg(feature = "tracing")]
    tracing::info!("Seeded {} users", store.len());

    let service = AuthService::new(config.clone(), store);
    let addr = config.server_addr.clone();

    if config.uds {
        return serve_uds(&addr, &config, service, providers).await;
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    announce(&addr, &config);
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    serve(incoming, service, providers).await
}

#[cfg(unix)]
async fn serve_uds(
    path: &str,
    config: &ServerConfig,
    service: AuthService,
    providers: TelemetryProviders,
) -> anyhow::Result<()> {
    let listener = tokio::net::UnixListener::bind(path)?;
    announce(path, config);
    let incoming = tokio_stream::wrappers::UnixListenerStream::new(listener);
    let served = serve(incoming, service, providers).await;
    // Remove the socket file even when serving failed.
    let _ = std::fs::remove_file(path);
    served
}

#[cfg(not(unix))]
async fn serve_uds(
    _path: &str,
    _config: &ServerConfig,
    _service: AuthService,
    _providers: TelemetryProviders,
) -> anyhow::Result<()> {
    anyhow::bail!("Unix domain sockets are not supported on this platform")
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn announce(addr: &str, config: &ServerConfig) {
    #[cfg(feature = "tracing")]
    {
        if cfg!(debug_assertions) {
            tracing::info!("userhub-auth listening on {addr} with {config:#?}");
        } else {
            tracing::info!(
                "userhub-auth listening on {addr}, max page size {}",
                config.max_page_size
            );
        }
    }
}

async fn serve<I, IO, IE>(
    incoming: I,
    service: AuthService,
    providers: TelemetryProviders,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health, health_service) = tonic_health::server::health_reporter();
    health.set_serving::<UsersServer>().await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(ServiceBuilder::new().layer(cors).layer(GrpcWebLayer::new()))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(users_server(service.clone()))
        .serve_with_incoming_shutdown(incoming, async move {
            wait_for_signal().await;
            drain(service, health, providers).await;
        })
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("userhub-auth stopped");
    Ok(())
}

/// Accepts zstd, gzip and deflate in both directions.
fn users_server(service: AuthService) -> UsersServer {
    [
        CompressionEncoding::Zstd,
        CompressionEncoding::Gzip,
        CompressionEncoding::Deflate,
    ]
    .into_iter()
    .fold(UsersServiceServer::new(service), |server, encoding| {
        server.send_compressed(encoding).accept_compressed(encoding)
    })
}

async fn wait_for_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Cannot listen for SIGTERM: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Cannot listen for Ctrl+C: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}

/// Stops advertising the service, lets sessions finish, then flushes
/// telemetry.
async fn drain(service: AuthService, health: HealthReporter, providers: TelemetryProviders) {
    health.set_not_serving::<UsersServer>().await;

    if let Err(_e) = service.shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during service shutdown: {:?}", _e);
    }

    providers.shutdown();
}
