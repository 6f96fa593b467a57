//! In-memory [`Store`] backed by a single `RwLock`.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use super::{BoxFuture, NewRecord, RecordQuery, Store, StoreError, StoredRecord};
use crate::geo::Polygon;

struct Entry {
    record: StoredRecord,
    geometries: Vec<Polygon>,
    authority: String,
}

#[derive(Default)]
struct Inner {
    /// Identity -> shared secret.
    identities: HashMap<String, Vec<u8>>,
    protocols: HashSet<String>,
    /// Records in insertion order.
    records: Vec<Entry>,
}

/// Store that keeps everything in process memory.
///
/// Every trait call takes the lock once, so each call is atomic with respect
/// to the others. Identities are matched lowercased and protocols uppercased,
/// the same normalization the session applies to `IDT` and `PRO`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identity with its signing secret.
    pub fn with_identity(self, identity: &str, secret: impl Into<Vec<u8>>) -> Self {
        self.add_identity(identity, secret);
        self
    }

    /// Registers a supported protocol.
    pub fn with_protocol(self, protocol: &str) -> Self {
        self.add_protocol(protocol);
        self
    }

    pub fn add_identity(&self, identity: &str, secret: impl Into<Vec<u8>>) {
        self.inner
            .write()
            .identities
            .insert(identity.to_lowercase(), secret.into());
    }

    pub fn add_protocol(&self, protocol: &str) {
        self.inner.write().protocols.insert(protocol.to_uppercase());
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Geometries stored for `uid`, for inspection.
    pub fn geometries(&self, uid: &str) -> Option<Vec<Polygon>> {
        self.inner
            .read()
            .records
            .iter()
            .find(|e| e.record.uid == uid)
            .map(|e| e.geometries.clone())
    }

    /// Identity that inserted `uid`.
    pub fn authority(&self, uid: &str) -> Option<String> {
        self.inner
            .read()
            .records
            .iter()
            .find(|e| e.record.uid == uid)
            .map(|e| e.authority.clone())
    }

    fn matching(&self, query: &RecordQuery) -> Vec<StoredRecord> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter(|e| query.matches_attributes(&e.record) && query.matches_area(&e.geometries))
            .map(|e| e.record.clone())
            .collect()
    }
}

impl Store for MemoryStore {
    fn check_identity<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { Ok(self.inner.read().identities.contains_key(identity)) })
    }

    fn check_protocol<'a>(&'a self, protocol: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { Ok(self.inner.read().protocols.contains(protocol)) })
    }

    fn fetch_secret<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>> {
        Box::pin(async move { Ok(self.inner.read().identities.get(identity).cloned()) })
    }

    fn check_record_exists<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            Ok(self
                .inner
                .read()
                .records
                .iter()
                .any(|e| e.record.uid == uid))
        })
    }

    fn insert(&self, record: NewRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            if inner.records.iter().any(|e| e.record.uid == record.uid) {
                return Err(StoreError::DuplicateUid(record.uid));
            }
            debug!(
                uid = %record.uid,
                geometries = record.geometries.len(),
                "Storing record"
            );
            let geometries = record.geometries.clone();
            let authority = record.authority.clone();
            inner.records.push(Entry {
                record: record.into(),
                geometries,
                authority,
            });
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        query: &'a RecordQuery,
    ) -> BoxStream<'a, Result<StoredRecord, StoreError>> {
        let mut matches = self.matching(query);
        if let Some(limit) = query.limit {
            matches.truncate(limit as usize);
        }
        stream::iter(matches.into_iter().map(Ok)).boxed()
    }

    fn count<'a>(&'a self, query: &'a RecordQuery) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move { Ok(self.matching(query).len() as u64) })
    }

    fn delete<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            let before = inner.records.len();
            inner.records.retain(|e| e.record.uid != uid);
            Ok(inner.records.len() != before)
        })
    }
}
