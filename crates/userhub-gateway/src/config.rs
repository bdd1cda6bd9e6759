use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use tonic::transport::Uri;
use userhub_core::types::{PAGE_SIZE, SESSION_TIMEOUT_SECS, TOTAL_USERS};

/// Runtime configuration for the `userhub-gateway` binary.
///
/// Values come from CLI flags or environment variables, after a `.env` file
/// has been loaded.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "userhub-gateway",
    version,
    about = "HTTP gateway for the userhub gRPC user service"
)]
pub struct CliArgs {
    /// Address the HTTP server binds to.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub listen_addr: String,

    /// URI of the `userhub-auth` gRPC service.
    ///
    /// Environment variable: `AUTH_ADDR`
    #[arg(long, env = "AUTH_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    pub auth_addr: String,

    /// Number of users the query orchestrator pages over.
    ///
    /// Environment variable: `TOTAL_USERS`
    #[arg(long, env = "TOTAL_USERS", default_value_t = TOTAL_USERS)]
    pub total_users: usize,

    /// Users requested per page descriptor.
    ///
    /// Environment variable: `PAGE_SIZE`
    #[arg(long, env = "PAGE_SIZE", default_value_t = PAGE_SIZE)]
    pub page_size: u32,

    /// Seconds to wait for each chunk before abandoning a query session.
    ///
    /// Environment variable: `SESSION_TIMEOUT_SECS`
    #[arg(long, env = "SESSION_TIMEOUT_SECS", default_value_t = SESSION_TIMEOUT_SECS)]
    pub session_timeout_secs: u64,

    /// Seconds background query sessions get to finish on shutdown before
    /// they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub auth_addr: String,
    pub total_users: usize,
    pub page_size: u32,
    pub session_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for GatewayConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.page_size == 0 {
            bail!("PAGE_SIZE must be greater than 0");
        }

        if args.session_timeout_secs == 0 {
            bail!("SESSION_TIMEOUT_SECS must be greater than 0");
        }

        args.auth_addr
            .parse::<Uri>()
            .with_context(|| format!("AUTH_ADDR is not a valid URI: {}", args.auth_addr))?;

        Ok(Self {
            listen_addr: args.listen_addr,
            auth_addr: args.auth_addr,
            total_users: args.total_users,
            page_size: args.page_size,
            session_timeout: Duration::from_secs(args.session_timeout_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}
