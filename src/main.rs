//! echo-once: a one-shot TCP echo fixture
//!
//! Binds a loopback listener, serves a fixed number of connections
//! (default 1), echoes each connection's first chunk of bytes back
//! verbatim, and exits. Used to validate that a client can send bytes
//! and receive them back.
//!
//! Features:
//! - Single bounded read per connection, relayed unmodified
//! - Explicit retry policy with backoff for failed attempts
//! - Configuration via CLI arguments or TOML file

mod config;
mod retry;
mod server;

use config::Config;
use server::EchoServer;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        read_buffer_size = config.read_buffer_size,
        max_connections = config.max_connections,
        "Starting echo fixture"
    );

    let server = EchoServer::new(config);

    // An interrupt drops the run future, which closes the listener and
    // releases the port.
    tokio::select! {
        result = server.run() => result?,
        _ = signal::ctrl_c() => {
            info!("Interrupted, releasing listener");
        }
    }

    Ok(())
}
