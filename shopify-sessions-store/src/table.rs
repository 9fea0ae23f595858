//! Backing table trait.

use crate::error::StoreResult;
use crate::schema::{DocumentId, RecordPatch, SessionDocument, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Document table holding session records.
///
/// This is the surface a managed document backend gives the session
/// operations: exact-match index reads plus single-document writes. Each
/// method is atomic on its own. [`SessionTable::upsert_by_session_id`] is
/// the one write that also covers the lookup before it.
///
/// Indexes a backend must provide:
///
/// - `by_session_id` on `id`
/// - `by_shop` on `shop`
/// - `by_expires` on `expires` (a full scan is acceptable)
#[async_trait]
pub trait SessionTable: Send + Sync {
    /// First document whose session `id` matches.
    async fn first_by_session_id(&self, session_id: &str) -> StoreResult<Option<SessionDocument>>;

    /// All documents for a shop, in insertion order.
    async fn collect_by_shop(&self, shop: &str) -> StoreResult<Vec<SessionDocument>>;

    /// All documents whose `expires` is set and strictly before `cutoff`.
    async fn collect_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionDocument>>;

    /// Insert a new document and return its id.
    async fn insert(&self, record: SessionRecord) -> StoreResult<DocumentId>;

    /// Store `record` under its session id.
    ///
    /// Patches the first document for `record.id` if there is one, otherwise
    /// inserts. Concurrent calls for the same id never create two documents.
    async fn upsert_by_session_id(&self, record: SessionRecord) -> StoreResult<DocumentId>;

    /// Apply a patch to an existing document.
    ///
    /// Returns `false` if the document no longer exists.
    async fn patch(&self, document_id: &DocumentId, patch: RecordPatch) -> StoreResult<bool>;

    /// Delete a document. Returns `false` if it was already gone.
    async fn delete(&self, document_id: &DocumentId) -> StoreResult<bool>;

    /// Number of stored documents.
    async fn count(&self) -> StoreResult<usize>;
}
