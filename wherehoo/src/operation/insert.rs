use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::OperationContext;
use crate::geo::Polygon;
use crate::protocol::TransportError;
use crate::store::{generate_record_id, NewRecord, RecordIdSource};

/// Central meridians the two geometries of a crossing area are drawn around.
const CROSSING_CENTERS: [f64; 2] = [360.0, 0.0];

/// Stores one record and replies its generated uid.
#[derive(Debug, Clone)]
pub struct InsertOperation {
    pub identity: String,
    /// Canonical record polygon.
    pub area: Polygon,
    pub height: f64,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub mimetype: String,
    pub protocol: String,
    pub meta: Option<String>,
}

impl InsertOperation {
    /// Geometries the record is matched on.
    ///
    /// An area spanning the 0°/360° meridian is stored twice, once drawn
    /// around each side, so a flat overlap test finds it from either half.
    pub fn geometries(&self) -> Vec<Polygon> {
        if self.area.crosses_meridian() {
            CROSSING_CENTERS
                .iter()
                .map(|&center| self.area.recentered(center))
                .collect()
        } else {
            vec![self.area.clone()]
        }
    }

    pub(super) async fn execute(self, ctx: &mut OperationContext<'_>) -> Result<(), TransportError> {
        let uid = generate_record_id(&RecordIdSource {
            server_addr: ctx.server_addr,
            client_addr: ctx.client_addr,
            payload: &self.payload,
            timestamp_millis: ctx.now.timestamp_millis(),
        });
        let geometries = self.geometries();

        let record = NewRecord {
            uid: uid.clone(),
            authority: self.identity,
            area: self.area,
            geometries,
            height: self.height,
            begin: self.begin,
            end: self.end,
            payload: self.payload,
            mimetype: self.mimetype,
            protocol: self.protocol,
            meta: self.meta,
        };

        match ctx.store.insert(record).await {
            Ok(()) => {
                info!(uid = %uid, "Record inserted");
                ctx.channel.write_line(&uid).await
            }
            Err(e) => {
                warn!(error = %e, "Insert failed");
                ctx.channel.write_line("NAK").await
            }
        }
    }
}
