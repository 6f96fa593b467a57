use tracing::{info, warn};

use super::OperationContext;
use crate::protocol::TransportError;

/// Removes one record by uid.
#[derive(Debug, Clone)]
pub struct DeleteOperation {
    uid: String,
}

impl DeleteOperation {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub(super) async fn execute(self, ctx: &mut OperationContext<'_>) -> Result<(), TransportError> {
        let reply = match ctx.store.delete(&self.uid).await {
            Ok(true) => {
                info!(uid = %self.uid, "Record deleted");
                "ACK"
            }
            Ok(false) => "NAK",
            Err(e) => {
                warn!(uid = %self.uid, error = %e, "Delete failed");
                "NAK"
            }
        };
        ctx.channel.write_line(reply).await
    }
}
