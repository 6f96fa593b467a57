//! TCP accept loop.
//!
//! Each accepted socket gets its own task running
//! [`connection::handle_stream`]. The only state shared between tasks is the
//! `Arc<dyn Store>`.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
//! let server = Server::bind(ServerConfig::default(), store).await?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(server.run(shutdown.clone()));
//! // ...
//! shutdown.cancel();
//! ```

mod connection;

pub use connection::{handle_stream, serve, Peer};

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{SessionLimits, DEFAULT_PORT};
use crate::store::Store;

/// Pause after an accept error that is not tied to a single connection.
pub const DEFAULT_ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors raised by the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener address and per-session limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub limits: SessionLimits,
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            limits: SessionLimits::default(),
            accept_backoff: DEFAULT_ACCEPT_BACKOFF,
        }
    }
}

impl ServerConfig {
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }
}

/// A bound Wherehoo server.
pub struct Server {
    listener: TcpListener,
    limits: Arc<SessionLimits>,
    store: Arc<dyn Store>,
    accept_backoff: Duration,
}

impl Server {
    pub async fn bind(config: ServerConfig, store: Arc<dyn Store>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            listener,
            limits: Arc::new(config.limits),
            store,
            accept_backoff: config.accept_backoff,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// Open connections are cancelled along with the loop.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, "Wherehoo server listening");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            if let Some(pause) = accept_backoff(&e, self.accept_backoff) {
                                tokio::time::sleep(pause).await;
                            }
                            continue;
                        }
                    };
                    debug!(client = %addr, "Connection accepted");

                    let store = Arc::clone(&self.store);
                    let limits = Arc::clone(&self.limits);
                    let cancelled = shutdown.child_token();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancelled.cancelled() => {
                                debug!(client = %addr, "Connection cancelled by shutdown");
                            }
                            _ = handle_stream(stream, store.as_ref(), &limits) => {}
                        }
                    });
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// How long to wait before accepting again after `error`.
///
/// A client that reset or aborted during the handshake only loses its own
/// connection; other failures such as descriptor exhaustion repeat until
/// something is released.
fn accept_backoff(error: &std::io::Error, pause: Duration) -> Option<Duration> {
    match error.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionRefused => None,
        _ => Some(pause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[test]
    fn test_default_config_listens_on_wherehoo_port() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 5650);
        let config = config.with_listen("127.0.0.1:0".parse().unwrap());
        assert_eq!(config.listen.port(), 0);
        assert_eq!(config.accept_backoff, DEFAULT_ACCEPT_BACKOFF);
    }

    #[test]
    fn test_accept_backoff_only_for_listener_errors() {
        let pause = Duration::from_millis(250);
        for kind in [
            ErrorKind::ConnectionAborted,
            ErrorKind::ConnectionReset,
            ErrorKind::ConnectionRefused,
        ] {
            assert_eq!(accept_backoff(&std::io::Error::from(kind), pause), None);
        }

        // EMFILE
        let exhausted = std::io::Error::from_raw_os_error(24);
        assert_eq!(accept_backoff(&exhausted, pause), Some(pause));
        let other = std::io::Error::new(ErrorKind::Other, "accept");
        assert_eq!(accept_backoff(&other, pause), Some(pause));

        let config = ServerConfig::default().with_accept_backoff(pause);
        assert_eq!(config.accept_backoff, pause);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Server::bind(
            ServerConfig::default().with_listen("127.0.0.1:0".parse().unwrap()),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();
        let err = Server::bind(
            ServerConfig::default().with_listen(taken),
            Arc::new(MemoryStore::new()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ServerError::Bind { addr, .. } if addr == taken));
    }

    #[tokio::test]
    async fn test_serves_tcp_client_until_shutdown() {
        let server = Server::bind(
            ServerConfig::default().with_listen("127.0.0.1:0".parse().unwrap()),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"IDT alice\nNOP\nBYE\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("wherehoo_server 0.85 200 12 1024 65535")
        );
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ACK"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("."));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("BYE"));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
