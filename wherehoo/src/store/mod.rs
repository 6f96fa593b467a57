//! Record storage behind a dyn-compatible trait.
//!
//! The [`Store`] trait is the only shared state between connections. It
//! answers the validation checks made while a session is being collected
//! (identities, protocols, secrets, record ids) and executes the four record
//! operations.
//!
//! # Geometries
//!
//! A record carries its canonical polygon (`area`) plus the geometries it is
//! matched on. For an area that spans the 0°/360° meridian those are two
//! copies of the same ring, recentered at 360° and at 0°, so a planar
//! overlap test against either search half finds it. Implementations must
//! write all geometries of one record atomically.

mod memory;
mod signature;

pub use memory::MemoryStore;
pub use signature::{
    generate_record_id, sign_payload, verify_signature, RecordIdSource, SIGNATURE_LEN,
};

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use crate::geo::Polygon;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A record with this id already exists.
    #[error("Duplicate record id: {0}")]
    DuplicateUid(String),

    /// The store is shutting down.
    #[error("Store is shutting down")]
    ShuttingDown,
}

/// A record about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub uid: String,
    /// Identity that inserted the record.
    pub authority: String,
    /// Canonical polygon, returned by searches.
    pub area: Polygon,
    /// Geometries used for overlap matching.
    pub geometries: Vec<Polygon>,
    pub height: f64,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub mimetype: String,
    pub protocol: String,
    pub meta: Option<String>,
}

/// A record as returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub uid: String,
    pub area: Polygon,
    pub height: f64,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub mimetype: String,
    pub protocol: String,
    pub meta: Option<String>,
}

impl From<NewRecord> for StoredRecord {
    fn from(record: NewRecord) -> Self {
        Self {
            uid: record.uid,
            area: record.area,
            height: record.height,
            begin: record.begin,
            end: record.end,
            payload: record.payload,
            mimetype: record.mimetype,
            protocol: record.protocol,
            meta: record.meta,
        }
    }
}

/// Closed time window a record's validity must overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeFilter {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    /// True if `[begin, end]` overlaps this window.
    pub fn overlaps(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        begin <= self.end && end >= self.begin
    }
}

/// Search and count predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    /// One polygon, or the two halves of a wrap-crossing search area.
    pub areas: Vec<Polygon>,
    pub time: TimeFilter,
    /// Exact mimetype match.
    pub mimetype: Option<String>,
    /// Exact protocol match.
    pub protocol: Option<String>,
    /// Substring of the record metadata.
    pub meta: Option<String>,
    /// Maximum number of records; `None` for no limit.
    pub limit: Option<u32>,
}

impl RecordQuery {
    pub fn new(areas: Vec<Polygon>, time: TimeFilter) -> Self {
        Self {
            areas,
            time,
            mimetype: None,
            protocol: None,
            meta: None,
            limit: None,
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// A limit of 0 means unlimited.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// True if any search area overlaps any of the record geometries.
    pub fn matches_area(&self, geometries: &[Polygon]) -> bool {
        self.areas
            .iter()
            .any(|area| geometries.iter().any(|g| area.overlaps(g)))
    }

    /// True if the non-spatial criteria accept `record`.
    pub fn matches_attributes(&self, record: &StoredRecord) -> bool {
        if !self.time.overlaps(record.begin, record.end) {
            return false;
        }
        if let Some(mimetype) = &self.mimetype {
            if &record.mimetype != mimetype {
                return false;
            }
        }
        if let Some(protocol) = &self.protocol {
            if &record.protocol != protocol {
                return false;
            }
        }
        if let Some(meta) = &self.meta {
            let found = record
                .meta
                .as_deref()
                .map(|m| m.contains(meta.as_str()))
                .unwrap_or(false);
            if !found {
                return false;
            }
        }
        true
    }
}

/// Record store interface.
///
/// # Dyn Compatibility
///
/// Async methods return boxed futures and streams so the server can hold an
/// `Arc<dyn Store>` shared by every connection task.
///
/// # Atomicity
///
/// Each call is atomic on its own. Nothing is held across calls, so a record
/// checked during validation may be gone by the time the operation runs.
pub trait Store: Send + Sync {
    /// True if `identity` is a registered client.
    fn check_identity<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// True if `protocol` is a supported record protocol.
    fn check_protocol<'a>(&'a self, protocol: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Shared secret used to sign payloads, if the identity has one.
    fn fetch_secret<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>>;

    /// True if a record with `uid` exists.
    fn check_record_exists<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Writes a record with all its geometries.
    fn insert(&self, record: NewRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Streams records matching `query`, honoring its limit.
    fn query<'a>(
        &'a self,
        query: &'a RecordQuery,
    ) -> BoxStream<'a, Result<StoredRecord, StoreError>>;

    /// Number of distinct records matching `query`; the limit is ignored.
    fn count<'a>(&'a self, query: &'a RecordQuery) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Removes the record with `uid` and all its geometries.
    ///
    /// Returns `true` if a record was removed.
    fn delete<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;
}
