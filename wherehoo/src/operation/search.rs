//! Area search: record matching, per-record headers and client directives.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, warn};

use super::OperationContext;
use crate::geo::{self, GeoPoint, Polygon, FULL_CIRCLE};
use crate::protocol::TransportError;
use crate::store::{RecordQuery, StoredRecord, TimeFilter};

/// The searched polygon and the client's position and facing.
#[derive(Debug, Clone)]
pub struct SearchArea {
    pub polygon: Polygon,
    /// First LLH point, the origin of bearings and distances.
    pub location: GeoPoint,
    pub height: f64,
    /// Client heading; bearings are reported relative to it.
    pub heading: f64,
}

impl SearchArea {
    pub fn new(polygon: Polygon, location: GeoPoint, height: f64, heading: f64) -> Self {
        Self {
            polygon,
            location,
            height,
            heading,
        }
    }
}

/// Search predicate shared by query and count.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub area: SearchArea,
    /// Window start; `None` means the moment the operation runs.
    pub begin: Option<DateTime<Utc>>,
    /// Window end; `None` means the moment the operation runs.
    pub end: Option<DateTime<Utc>>,
    pub mimetype: Option<String>,
    pub protocol: Option<String>,
    pub meta: Option<String>,
    /// 0 means unlimited.
    pub limit: Option<u32>,
}

impl SearchFilter {
    /// Store query for this filter evaluated at `now`.
    pub fn to_query(&self, now: DateTime<Utc>) -> RecordQuery {
        let time = TimeFilter::new(self.begin.unwrap_or(now), self.end.unwrap_or(now));
        let mut query = RecordQuery::new(self.area.polygon.split(), time);
        if let Some(mimetype) = &self.mimetype {
            query = query.with_mimetype(mimetype.as_str());
        }
        if let Some(protocol) = &self.protocol {
            query = query.with_protocol(protocol.as_str());
        }
        if let Some(meta) = &self.meta {
            query = query.with_meta(meta.as_str());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        query
    }
}

/// Header line announcing one search result.
///
/// `bearing quadrant distance ttl length protocol mimetype META|NONE`, with
/// the bearing relative to the client's heading and the quadrant absolute.
pub fn record_header(
    area: &SearchArea,
    record: &StoredRecord,
    now: DateTime<Utc>,
    max_ttl: u64,
) -> String {
    let heading = geo::heading_to_polygon(area.location, &record.area);
    let distance = geo::distance_to_polygon(area.location, &record.area);
    let bearing = (heading - area.heading + FULL_CIRCLE) % FULL_CIRCLE;
    let ttl = (record.end - now).num_seconds().unsigned_abs().min(max_ttl);
    let meta_status = match record.meta.as_deref() {
        Some(meta) if !meta.is_empty() => "META",
        _ => "NONE",
    };

    format!(
        "{} {} {} {} {} {} {} {}",
        bearing.round() as i64,
        geo::quadrant(heading),
        distance.round() as i64,
        ttl,
        record.payload.len(),
        record.protocol,
        record.mimetype,
        meta_status
    )
}

/// What the client asked for after a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Meta,
    Data,
    Next,
    Stop,
}

impl Directive {
    fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "meta" => Directive::Meta,
            "data" => Directive::Data,
            "next" | "skip" => Directive::Next,
            _ => Directive::Stop,
        }
    }
}

/// Streams matching records to the client one at a time.
#[derive(Debug, Clone)]
pub struct SearchOperation {
    filter: SearchFilter,
}

impl SearchOperation {
    pub fn new(filter: SearchFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &SearchFilter {
        &self.filter
    }

    pub(super) async fn execute(self, ctx: &mut OperationContext<'_>) -> Result<(), TransportError> {
        let query = self.filter.to_query(ctx.now);
        let mut records = ctx.store.query(&query);
        let mut sent = 0usize;

        'records: while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Search aborted by store error");
                    break;
                }
            };
            let header = record_header(&self.filter.area, &record, ctx.now, ctx.max_ttl);
            ctx.channel.write_line(&header).await?;
            sent += 1;

            loop {
                let line = ctx.channel.read_line().await?;
                match Directive::parse(&line) {
                    Directive::Meta => {
                        ctx.channel
                            .write_line(record.meta.as_deref().unwrap_or(""))
                            .await?
                    }
                    Directive::Data => ctx.channel.write_bytes(&record.payload).await?,
                    Directive::Next => continue 'records,
                    Directive::Stop => break 'records,
                }
            }
        }

        debug!(sent, "Search finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::test_support::{channel, output};
    use crate::store::{MemoryStore, NewRecord, Store};
    use chrono::TimeDelta;
    use tokio::io::AsyncWriteExt;

    const HERE: GeoPoint = GeoPoint::new(42.0, 288.0);

    fn record(uid: &str, center: GeoPoint, meta: Option<&str>) -> NewRecord {
        let area = Polygon::square(center, 50.0);
        let now = Utc::now();
        NewRecord {
            uid: uid.to_string(),
            authority: "alice".to_string(),
            geometries: vec![area.clone()],
            area,
            height: 0.0,
            begin: now - TimeDelta::minutes(1),
            end: now + TimeDelta::hours(1),
            payload: b"hello".to_vec(),
            mimetype: "text/plain".to_string(),
            protocol: "HTTP".to_string(),
            meta: meta.map(String::from),
        }
    }

    fn filter() -> SearchFilter {
        SearchFilter {
            area: SearchArea::new(Polygon::square(HERE, 1_000.0), HERE, 0.0, 0.0),
            begin: None,
            end: None,
            mimetype: None,
            protocol: None,
            meta: None,
            limit: None,
        }
    }

    #[test]
    fn test_header_for_record_to_the_east() {
        let now = Utc::now();
        let east = geo::project(HERE, 90.0, 500.0);
        let stored: StoredRecord = record("r", east, Some("cafe")).into();
        let area = SearchArea::new(Polygon::square(HERE, 1_000.0), HERE, 0.0, 0.0);

        let header = record_header(&area, &stored, now, 99_999_999);
        let parts: Vec<&str> = header.split(' ').collect();
        assert_eq!(parts.len(), 8);
        let bearing: i64 = parts[0].parse().unwrap();
        assert!((85..=95).contains(&bearing), "bearing {}", bearing);
        assert_eq!(parts[1], "E");
        let distance: i64 = parts[2].parse().unwrap();
        assert!((440..=460).contains(&distance), "distance {}", distance);
        assert_eq!(&parts[4..], ["5", "HTTP", "text/plain", "META"]);
    }

    #[test]
    fn test_header_bearing_relative_to_heading() {
        let now = Utc::now();
        let east = geo::project(HERE, 90.0, 500.0);
        let stored: StoredRecord = record("r", east, None).into();
        let area = SearchArea::new(Polygon::square(HERE, 1_000.0), HERE, 0.0, 180.0);

        let header = record_header(&area, &stored, now, 99_999_999);
        let parts: Vec<&str> = header.split(' ').collect();
        let bearing: i64 = parts[0].parse().unwrap();
        assert!((265..=275).contains(&bearing), "bearing {}", bearing);
        assert_eq!(parts[1], "E");
        assert_eq!(parts[7], "NONE");
    }

    #[test]
    fn test_header_ttl_capped() {
        let now = Utc::now();
        let stored: StoredRecord = record("r", HERE, None).into();
        let area = SearchArea::new(Polygon::square(HERE, 1_000.0), HERE, 0.0, 0.0);
        let header = record_header(&area, &stored, now, 60);
        assert_eq!(header.split(' ').nth(3), Some("60"));
        // inside the record: no distance
        assert_eq!(header.split(' ').nth(2), Some("0"));
    }

    #[test]
    fn test_directive_parsing() {
        assert_eq!(Directive::parse("META"), Directive::Meta);
        assert_eq!(Directive::parse(" data "), Directive::Data);
        assert_eq!(Directive::parse("skip"), Directive::Next);
        assert_eq!(Directive::parse("next"), Directive::Next);
        assert_eq!(Directive::parse("quit"), Directive::Stop);
        assert_eq!(Directive::parse(""), Directive::Stop);
    }

    #[test]
    fn test_query_defaults_window_to_now() {
        let now = Utc::now();
        let query = filter().to_query(now);
        assert_eq!(query.time, TimeFilter::new(now, now));
        assert_eq!(query.areas.len(), 1);
        assert_eq!(query.limit, None);
    }

    #[tokio::test]
    async fn test_execute_streams_with_directives() {
        let store = MemoryStore::new();
        store.insert(record("a", HERE, Some("cafe"))).await.unwrap();
        store.insert(record("b", HERE, None)).await.unwrap();

        let (mut chan, mut client) = channel();
        client.write_all(b"meta\ndata\nnext\nstop\n").await.unwrap();
        let mut ctx = OperationContext {
            store: &store,
            channel: &mut chan,
            server_addr: "s",
            client_addr: "c",
            now: Utc::now(),
            max_ttl: 99_999_999,
        };
        SearchOperation::new(filter()).execute(&mut ctx).await.unwrap();

        let out = output(chan, client).await;
        let lines: Vec<&str> = out.split('\n').collect();
        assert!(lines[0].ends_with("HTTP text/plain META"));
        assert_eq!(lines[1], "cafe");
        assert!(lines[2].starts_with("hello"));
        assert!(lines[2].ends_with("HTTP text/plain NONE"));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn test_execute_honors_limit() {
        let store = MemoryStore::new();
        for uid in ["a", "b", "c"] {
            store.insert(record(uid, HERE, None)).await.unwrap();
        }
        let (mut chan, mut client) = channel();
        client.write_all(b"next\nnext\nnext\n").await.unwrap();
        let mut search = filter();
        search.limit = Some(2);
        let mut ctx = OperationContext {
            store: &store,
            channel: &mut chan,
            server_addr: "s",
            client_addr: "c",
            now: Utc::now(),
            max_ttl: 99_999_999,
        };
        SearchOperation::new(search).execute(&mut ctx).await.unwrap();

        let out = output(chan, client).await;
        assert_eq!(out.lines().count(), 2);
    }
}
