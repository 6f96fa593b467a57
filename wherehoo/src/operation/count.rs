use tracing::{debug, warn};

use super::{OperationContext, SearchFilter};
use crate::protocol::TransportError;

/// Replies the number of records a search would match, ignoring its limit.
#[derive(Debug, Clone)]
pub struct CountOperation {
    filter: SearchFilter,
}

impl CountOperation {
    pub fn new(filter: SearchFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &SearchFilter {
        &self.filter
    }

    pub(super) async fn execute(self, ctx: &mut OperationContext<'_>) -> Result<(), TransportError> {
        let query = self.filter.to_query(ctx.now);
        match ctx.store.count(&query).await {
            Ok(count) => {
                debug!(count, "Count finished");
                ctx.channel.write_line(&count.to_string()).await
            }
            Err(e) => {
                warn!(error = %e, "Count failed");
                ctx.channel.write_line("NAK").await
            }
        }
    }
}
