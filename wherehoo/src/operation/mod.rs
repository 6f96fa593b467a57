//! Validated operations and their execution against a store.
//!
//! An [`Operation`] is only ever built by
//! [`build_operation`](crate::protocol::build_operation), so every value it
//! carries has already passed the per-action checks. Executing it writes the
//! operation output to the client; the connection driver frames that output
//! with `ACK` before and `.`/`BYE` after.

mod count;
mod delete;
mod insert;
mod search;

pub use count::CountOperation;
pub use delete::DeleteOperation;
pub use insert::InsertOperation;
pub use search::{record_header, SearchArea, SearchFilter, SearchOperation};

use chrono::{DateTime, Utc};

use crate::protocol::{LineChannel, TransportError};
use crate::store::Store;

/// Everything an operation needs while it runs.
pub struct OperationContext<'a> {
    pub store: &'a dyn Store,
    pub channel: &'a mut LineChannel,
    /// Local address of the accepted socket.
    pub server_addr: &'a str,
    /// Peer address of the accepted socket.
    pub client_addr: &'a str,
    /// Clock reading taken when the client proceeded.
    pub now: DateTime<Utc>,
    /// Cap on the TTL reported in search headers, in seconds.
    pub max_ttl: u64,
}

/// A validated client request.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert(InsertOperation),
    Search(SearchOperation),
    Count(CountOperation),
    Delete(DeleteOperation),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert(_) => "insert",
            Operation::Search(_) => "query",
            Operation::Count(_) => "count",
            Operation::Delete(_) => "delete",
        }
    }

    /// Runs the operation, writing its output to the context channel.
    ///
    /// Store failures are reported to the client in-band; only transport
    /// failures are returned.
    pub async fn execute(self, ctx: &mut OperationContext<'_>) -> Result<(), TransportError> {
        match self {
            Operation::Insert(op) => op.execute(ctx).await,
            Operation::Search(op) => op.execute(ctx).await,
            Operation::Count(op) => op.execute(ctx).await,
            Operation::Delete(op) => op.execute(ctx).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt, BufReader, DuplexStream};

    use crate::protocol::LineChannel;

    /// Channel whose peer end is returned for the test to drive.
    pub fn channel() -> (LineChannel, DuplexStream) {
        let (server, client) = duplex(64 * 1024);
        let (read, write) = tokio::io::split(server);
        let channel = LineChannel::new(BufReader::new(read), write, Duration::from_secs(5));
        (channel, client)
    }

    /// Drains whatever the server wrote once the channel is dropped.
    pub async fn output(channel: LineChannel, mut client: DuplexStream) -> String {
        drop(channel);
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out
    }
}
