use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use userhub_core::types::{MAX_PAGE_SIZE, SESSION_TIMEOUT_SECS, TOTAL_USERS};

/// Runtime configuration for the `userhub-auth` binary.
///
/// Every value can be given as a CLI flag or an environment variable (a `.env`
/// file is loaded first). Defaults are suitable for local development.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "userhub-auth",
    version,
    about = "A gRPC user service with streaming pagination"
)]
pub struct CliArgs {
    /// Number of fake users created at startup.
    ///
    /// Environment variable: `SEED_USERS`
    #[arg(long, env = "SEED_USERS", default_value_t = TOTAL_USERS)]
    pub seed_users: usize,

    /// Capacity of the response buffer between a pagination session and its
    /// gRPC stream.
    ///
    /// This bounds how many `Users` chunks can be computed ahead of the
    /// client. Lower values increase backpressure responsiveness; higher values
    /// enable deeper pipelining.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Largest `size` accepted in a single page descriptor.
    ///
    /// Environment variable: `MAX_PAGE_SIZE`
    #[arg(long, env = "MAX_PAGE_SIZE", default_value_t = MAX_PAGE_SIZE)]
    pub max_page_size: u32,

    /// Seconds a pagination session may wait for the next descriptor before it
    /// is terminated.
    ///
    /// Environment variable: `SESSION_TIMEOUT_SECS`
    #[arg(long, env = "SESSION_TIMEOUT_SECS", default_value_t = SESSION_TIMEOUT_SECS)]
    pub session_timeout_secs: u64,

    /// Seconds to wait for in-flight sessions to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/userhub-auth.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub seed_users: usize,
    pub stream_buffer_size: usize,
    pub max_page_size: u32,
    pub session_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.max_page_size == 0 {
            bail!("MAX_PAGE_SIZE must be greater than 0");
        }

        if args.session_timeout_secs == 0 {
            bail!("SESSION_TIMEOUT_SECS must be greater than 0");
        }

        Ok(Self {
            seed_users: args.seed_users,
            stream_buffer_size: args.stream_buffer_size,
            max_page_size: args.max_page_size,
            session_timeout: Duration::from_secs(args.session_timeout_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            seed_users: TOTAL_USERS,
            stream_buffer_size: 8,
            max_page_size: MAX_PAGE_SIZE,
            session_timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(3),
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
        }
    }
}
