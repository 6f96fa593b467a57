//! One client connection from greeting to `BYE`.

use chrono::Utc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::operation::OperationContext;
use crate::protocol::{build_operation, LineChannel, Outcome, Session, SessionLimits, TransportError};
use crate::store::Store;

/// Addresses of an accepted socket, as text.
#[derive(Debug, Clone)]
pub struct Peer {
    pub server_addr: String,
    pub client_addr: String,
}

/// Runs a session over an accepted TCP stream.
pub async fn handle_stream(stream: TcpStream, store: &dyn Store, limits: &SessionLimits) {
    let peer = Peer {
        server_addr: stream
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default(),
        client_addr: stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default(),
    };
    let (read, write) = stream.into_split();
    let mut channel = LineChannel::new(BufReader::new(read), write, limits.idle_timeout);

    match serve(&mut channel, store, limits, &peer).await {
        Ok(()) => debug!(client = %peer.client_addr, "Connection closed"),
        Err(TransportError::Closed) => {
            debug!(client = %peer.client_addr, "Client hung up")
        }
        Err(e) => warn!(client = %peer.client_addr, error = %e, "Connection aborted"),
    }
}

/// Collects, validates and executes one request on `channel`.
///
/// The closing `.` and `BYE` are written whenever the transport is still
/// usable, including after a rejected or abandoned session.
pub async fn serve(
    channel: &mut LineChannel,
    store: &dyn Store,
    limits: &SessionLimits,
    peer: &Peer,
) -> Result<(), TransportError> {
    let mut session = Session::new(limits.clone(), Utc::now());
    let outcome = session.collect(channel).await?;

    if outcome == Outcome::Proceed {
        let now = Utc::now();
        match build_operation(session.into_fields(), store, limits, now).await {
            Ok(operation) => {
                info!(client = %peer.client_addr, operation = operation.name(), "Request accepted");
                channel.write_line("ACK").await?;
                let mut ctx = OperationContext {
                    store,
                    channel: &mut *channel,
                    server_addr: &peer.server_addr,
                    client_addr: &peer.client_addr,
                    now,
                    max_ttl: limits.max_ttl,
                };
                operation.execute(&mut ctx).await?;
            }
            Err(rejected) => {
                info!(client = %peer.client_addr, rejected = %rejected, "Request rejected");
                channel.write_line(&format!("NAK {}", rejected)).await?;
            }
        }
    }

    channel.write_line(".").await?;
    channel.write_line("BYE").await
}
