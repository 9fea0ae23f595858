//! In-memory session table.

use crate::error::StoreResult;
use crate::schema::{DocumentId, RecordPatch, SessionDocument, SessionRecord};
use crate::table::SessionTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Secondary index from a field value to documents, in creation order.
struct Index<K> {
    entries: HashMap<K, BTreeMap<u64, DocumentId>>,
}

impl<K: Hash + Eq> Index<K> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, key: K, seq: u64, document_id: DocumentId) {
        self.entries.entry(key).or_default().insert(seq, document_id);
    }

    fn remove<Q>(&mut self, key: &Q, seq: u64)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(bucket) = self.entries.get_mut(key) {
            bucket.remove(&seq);
            if bucket.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn get<Q>(&self, key: &Q) -> impl Iterator<Item = &DocumentId>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).into_iter().flat_map(|bucket| bucket.values())
    }
}

struct Entry {
    seq: u64,
    document: SessionDocument,
}

struct Tables {
    documents: HashMap<DocumentId, Entry>,
    by_session_id: Index<String>,
    by_shop: Index<String>,
    by_expires: BTreeMap<(DateTime<Utc>, u64), DocumentId>,
    next_seq: u64,
}

impl Tables {
    fn new() -> Self {
        Self {
            documents: HashMap::new(),
            by_session_id: Index::new(),
            by_shop: Index::new(),
            by_expires: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn index(&mut self, seq: u64, document: &SessionDocument) {
        let id = &document.document_id;
        self.by_session_id
            .insert(document.record.id.clone(), seq, id.clone());
        self.by_shop
            .insert(document.record.shop.clone(), seq, id.clone());
        if let Some(expires) = document.record.expires {
            self.by_expires.insert((expires, seq), id.clone());
        }
    }

    fn unindex(&mut self, seq: u64, document: &SessionDocument) {
        self.by_session_id.remove(document.record.id.as_str(), seq);
        self.by_shop.remove(document.record.shop.as_str(), seq);
        if let Some(expires) = document.record.expires {
            self.by_expires.remove(&(expires, seq));
        }
    }

    fn resolve<'a>(&self, ids: impl Iterator<Item = &'a DocumentId>) -> Vec<SessionDocument> {
        ids.filter_map(|id| self.documents.get(id))
            .map(|entry| entry.document.clone())
            .collect()
    }

    fn insert(&mut self, record: SessionRecord) -> DocumentId {
        let document = SessionDocument::create(record);
        let document_id = document.document_id.clone();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index(seq, &document);
        self.documents
            .insert(document_id.clone(), Entry { seq, document });

        document_id
    }

    fn patch(&mut self, document_id: &DocumentId, patch: RecordPatch) -> bool {
        let Some(Entry { seq, mut document }) = self.documents.remove(document_id) else {
            return false;
        };

        self.unindex(seq, &document);
        document.record.apply(patch);
        self.index(seq, &document);
        self.documents
            .insert(document_id.clone(), Entry { seq, document });

        true
    }
}

/// Session table held in process memory.
///
/// Maintains the `by_session_id`, `by_shop` and `by_expires` indexes on every
/// write. Clones share the same underlying data.
///
/// # Examples
///
/// ```
/// use shopify_sessions_store::{MemorySessionTable, SessionOperations, SessionRecord};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), shopify_sessions_store::StoreError> {
/// let sessions = SessionOperations::new(MemorySessionTable::new());
/// sessions.store(SessionRecord::offline("example.myshopify.com")).await?;
/// assert!(sessions.get_offline_by_shop("example.myshopify.com").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemorySessionTable {
    tables: Arc<RwLock<Tables>>,
}

impl MemorySessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::new())),
        }
    }

    /// Remove every document.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::new();
    }

    /// Snapshot of all documents in creation order.
    pub async fn documents(&self) -> Vec<SessionDocument> {
        let tables = self.tables.read().await;
        let mut entries: Vec<&Entry> = tables.documents.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.document.clone()).collect()
    }
}

impl Default for MemorySessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionTable for MemorySessionTable {
    async fn first_by_session_id(&self, session_id: &str) -> StoreResult<Option<SessionDocument>> {
        let tables = self.tables.read().await;
        Ok(tables
            .resolve(tables.by_session_id.get(session_id).take(1))
            .into_iter()
            .next())
    }

    async fn collect_by_shop(&self, shop: &str) -> StoreResult<Vec<SessionDocument>> {
        let tables = self.tables.read().await;
        Ok(tables.resolve(tables.by_shop.get(shop)))
    }

    async fn collect_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionDocument>> {
        let tables = self.tables.read().await;
        // (cutoff, 0) sorts after every (t, seq) with t < cutoff and before
        // every key with t == cutoff.
        let ids = tables.by_expires.range(..(cutoff, 0)).map(|(_, id)| id);
        Ok(tables.resolve(ids))
    }

    async fn insert(&self, record: SessionRecord) -> StoreResult<DocumentId> {
        Ok(self.tables.write().await.insert(record))
    }

    async fn upsert_by_session_id(&self, record: SessionRecord) -> StoreResult<DocumentId> {
        let mut tables = self.tables.write().await;
        let existing = tables.by_session_id.get(record.id.as_str()).next().cloned();

        match existing {
            Some(document_id) => {
                tables.patch(&document_id, RecordPatch::from(record));
                Ok(document_id)
            }
            None => Ok(tables.insert(record)),
        }
    }

    async fn patch(&self, document_id: &DocumentId, patch: RecordPatch) -> StoreResult<bool> {
        Ok(self.tables.write().await.patch(document_id, patch))
    }

    async fn delete(&self, document_id: &DocumentId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.documents.remove(document_id) {
            Some(entry) => {
                tables.unindex(entry.seq, &entry.document);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.tables.read().await.documents.len())
    }
}
