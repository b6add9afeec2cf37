//! TCP echo server.
//!
//! Accepts connections sequentially, reads one bounded chunk from each,
//! writes it back verbatim, and closes the connection. Returns after the
//! configured connection quota is served. Failed attempts go through the
//! retry policy instead of being silently swallowed.

use crate::config::Config;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Listen backlog; the fixture serves one connection at a time, so a
/// small queue is plenty.
const LISTEN_BACKLOG: i32 = 128;

/// Server instance
pub struct EchoServer {
    config: Config,
}

impl EchoServer {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        EchoServer { config }
    }

    /// Bind the listener and serve until the connection quota is met.
    ///
    /// Bind failures are fatal: a port held by another process must
    /// surface to the operator rather than rebind forever.
    pub async fn run(&self) -> Result<(), EchoError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Create the listening socket with the reuse-address option enabled,
    /// so repeated fixture restarts do not fail on "address in use".
    fn bind(&self) -> Result<TcpListener, EchoError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| EchoError::InvalidAddress(self.config.host.clone(), e))?;

        let socket = socket2::Socket::new(
            match addr {
                SocketAddr::V4(_) => socket2::Domain::IPV4,
                SocketAddr::V6(_) => socket2::Domain::IPV6,
            },
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .map_err(EchoError::Bind)?;

        socket.set_reuse_address(true).map_err(EchoError::Bind)?;
        socket.set_nonblocking(true).map_err(EchoError::Bind)?;
        socket.bind(&addr.into()).map_err(EchoError::Bind)?;
        socket.listen(LISTEN_BACKLOG).map_err(EchoError::Bind)?;

        let listener = TcpListener::from_std(socket.into()).map_err(EchoError::Bind)?;
        let bound = listener.local_addr().map_err(EchoError::Bind)?;
        info!(address = %bound, "Listener bound");
        Ok(listener)
    }

    /// Accept and echo until `max_connections` connections are served.
    ///
    /// Accept/read/write errors consult the retry policy: sleep the
    /// backoff delay and retry the accept, or give up once the policy's
    /// attempt cap is exhausted. A successful echo resets the backoff.
    async fn serve(&self, listener: TcpListener) -> Result<(), EchoError> {
        let mut served = 0usize;
        let mut backoff = self.config.retry.backoff();

        while served < self.config.max_connections {
            match self.accept_and_echo(&listener).await {
                Ok(bytes) => {
                    served += 1;
                    backoff.reset();
                    debug!(bytes, served, "Echo complete");
                }
                Err(e) => {
                    warn!(error = %e, "Connection attempt failed");
                    match backoff.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(EchoError::RetriesExhausted {
                                attempts: backoff.attempts(),
                                source: e,
                            })
                        }
                    }
                }
            }
        }

        info!(served, "Connection quota served, shutting down");
        Ok(())
    }

    /// Serve one connection: a single bounded read, echoed back in full.
    ///
    /// One read call only; a client that writes more than the buffer
    /// capacity gets back just the first chunk that read delivers. A
    /// zero-byte read (client closed without sending) still counts as a
    /// served connection with an empty echo. Dropping the stream closes
    /// the connection.
    async fn accept_and_echo(&self, listener: &TcpListener) -> io::Result<usize> {
        let (mut stream, peer) = listener.accept().await?;
        debug!(%peer, "New connection");

        let mut buffer = vec![0u8; self.config.read_buffer_size];
        let n = stream.read(&mut buffer).await?;
        stream.write_all(&buffer[..n]).await?;

        Ok(n)
    }
}

/// Server errors
#[derive(Debug)]
pub enum EchoError {
    InvalidAddress(String, std::net::AddrParseError),
    Bind(io::Error),
    RetriesExhausted { attempts: u32, source: io::Error },
}

impl std::fmt::Display for EchoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EchoError::InvalidAddress(host, e) => {
                write!(f, "Invalid bind address '{}': {}", host, e)
            }
            EchoError::Bind(e) => write!(f, "Failed to bind listener: {}", e),
            EchoError::RetriesExhausted { attempts, source } => {
                write!(f, "Giving up after {} failed attempts: {}", attempts, source)
            }
        }
    }
}

impl std::error::Error for EchoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EchoError::InvalidAddress(_, e) => Some(e),
            EchoError::Bind(e) => Some(e),
            EchoError::RetriesExhausted { source, .. } => Some(source),
        }
    }
}
