//! Session CRUD operations over a [`SessionTable`].

use crate::error::{StoreError, StoreResult};
use crate::schema::{DocumentId, RecordPatch, SessionDocument, SessionRecord};
use crate::table::SessionTable;
use chrono::{DateTime, Utc};
use shopify_sessions_log::{debug, info, redact};
use std::sync::Arc;

/// The session operations every façade calls.
///
/// A missing session is a normal outcome: reads return `None` or an empty
/// list, deletes and scope updates return `false`. Only the `require_*`
/// helpers treat absence as an error.
///
/// Multi-record deletes run as independent per-record deletes. A failure
/// part way through leaves earlier deletions in place.
pub struct SessionOperations<T: ?Sized> {
    table: Arc<T>,
}

impl<T: ?Sized> Clone for SessionOperations<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: SessionTable> SessionOperations<T> {
    /// Wrap a table.
    pub fn new(table: T) -> Self {
        Self {
            table: Arc::new(table),
        }
    }
}

impl<T: SessionTable + ?Sized> SessionOperations<T> {
    /// Wrap a shared table, e.g. an `Arc<dyn SessionTable>`.
    pub fn from_arc(table: Arc<T>) -> Self {
        Self { table }
    }

    /// The backing table.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Load a session by id.
    pub async fn load(&self, id: &str) -> StoreResult<Option<SessionDocument>> {
        self.table.first_by_session_id(id).await
    }

    /// Insert a session, or patch the existing one with the same id.
    ///
    /// Optional fields left unset keep their stored value, so storing twice
    /// never creates a second record and the latest supplied values win.
    /// Concurrent stores for one id also end with a single record.
    pub async fn store(&self, record: SessionRecord) -> StoreResult<DocumentId> {
        record.validate()?;
        let token = record.access_token.as_deref().map(redact).unwrap_or_default();
        debug!("Storing session {} (token {})", record.id, token);

        self.table.upsert_by_session_id(record).await
    }

    /// Delete a session by id. Returns `false` if there was none.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        match self.table.first_by_session_id(id).await? {
            Some(existing) => {
                let deleted = self.table.delete(&existing.document_id).await?;
                debug!("Deleted session {}: {}", id, deleted);
                Ok(deleted)
            }
            None => Ok(false),
        }
    }

    /// Delete several sessions.
    ///
    /// Returns `true` only if every id was found. Ids that were found are
    /// deleted either way.
    pub async fn delete_many(&self, ids: &[String]) -> StoreResult<bool> {
        let mut all_found = true;
        for id in ids {
            if !self.delete(id).await? {
                all_found = false;
            }
        }
        Ok(all_found)
    }

    /// All sessions of a shop, in insertion order.
    pub async fn find_by_shop(&self, shop: &str) -> StoreResult<Vec<SessionDocument>> {
        self.table.collect_by_shop(shop).await
    }

    /// The first offline session of a shop.
    pub async fn get_offline_by_shop(&self, shop: &str) -> StoreResult<Option<SessionDocument>> {
        let sessions = self.table.collect_by_shop(shop).await?;
        Ok(sessions.into_iter().find(|doc| !doc.record.is_online))
    }

    /// Delete every session of a shop.
    pub async fn delete_by_shop(&self, shop: &str) -> StoreResult<()> {
        let sessions = self.table.collect_by_shop(shop).await?;
        let total = sessions.len();
        for doc in sessions {
            self.table.delete(&doc.document_id).await?;
        }
        debug!("Deleted {} sessions for shop {}", total, shop);
        Ok(())
    }

    /// Delete sessions whose `expires` is strictly before `now`.
    ///
    /// Sessions without an expiry are never removed. Returns the number of
    /// sessions deleted.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let expired = self.table.collect_expiring_before(now).await?;
        let mut deleted = 0;
        for doc in expired {
            if self.table.delete(&doc.document_id).await? {
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!("Removed {} expired sessions", deleted);
        }
        Ok(deleted)
    }

    /// Replace only the scope of a session. Returns `false` if there was none.
    pub async fn update_scope(&self, id: &str, scope: &str) -> StoreResult<bool> {
        match self.table.first_by_session_id(id).await? {
            Some(existing) => {
                self.table
                    .patch(&existing.document_id, RecordPatch::scope(scope))
                    .await
            }
            None => Ok(false),
        }
    }

    /// Load a session that must exist.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no session has this id.
    pub async fn require_session(&self, id: &str) -> StoreResult<SessionDocument> {
        self.load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("No session found with id {}", id)))
    }

    /// Load the offline session of a shop that must have one.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the shop has no offline session.
    pub async fn require_offline_session(&self, shop: &str) -> StoreResult<SessionDocument> {
        self.get_offline_by_shop(shop)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("No offline token found for {}", shop)))
    }

    /// Access token of a shop's offline session, for background jobs and
    /// webhooks that run without a user.
    pub async fn offline_access_token(&self, shop: &str) -> StoreResult<String> {
        let session = self.require_offline_session(shop).await?;
        session.record.access_token.ok_or_else(|| {
            StoreError::NotFound(format!("Offline session for {} has no access token", shop))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionTable;
    use crate::schema::{AssociatedUser, OnlineAccessInfo, parse_iso};
    use async_trait::async_trait;
    use std::time::Duration;

    const SHOP: &str = "test-shop.myshopify.com";

    fn operations() -> SessionOperations<MemorySessionTable> {
        SessionOperations::new(MemorySessionTable::new())
    }

    fn offline() -> SessionRecord {
        SessionRecord::offline(SHOP)
            .with_scope("read_products,write_orders")
            .with_access_token("shpat_abc123")
    }

    fn online() -> SessionRecord {
        SessionRecord::new("online_test-shop.myshopify.com_1", SHOP, true)
            .with_scope("read_products")
            .with_access_token("shpat_online_xyz")
            .with_online_access_info(OnlineAccessInfo {
                expires_in: 86400,
                associated_user_scope: "read_products".to_string(),
                associated_user: AssociatedUser {
                    id: 1,
                    first_name: "Test".to_string(),
                    last_name: "User".to_string(),
                    email: "test@example.com".to_string(),
                    account_owner: true,
                    locale: "en".to_string(),
                    collaborator: false,
                    email_verified: true,
                },
            })
    }

    #[tokio::test]
    async fn test_store_and_load_round_trip() {
        let ops = operations();
        ops.store(online()).await.unwrap();

        let loaded = ops.load(&online().id).await.unwrap().unwrap();
        assert_eq!(loaded.record, online());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        assert!(operations().load("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_upserts_without_duplicates() {
        let ops = operations();
        let first = ops.store(offline()).await.unwrap();
        let second = ops
            .store(offline().with_access_token("shpat_updated"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let sessions = ops.find_by_shop(SHOP).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].record.access_token.as_deref(), Some("shpat_updated"));
    }

    #[tokio::test]
    async fn test_store_keeps_fields_not_supplied() {
        let ops = operations();
        ops.store(offline().with_state("nonce")).await.unwrap();
        ops.store(SessionRecord::offline(SHOP)).await.unwrap();

        let loaded = ops.require_session(&offline().id).await.unwrap();
        assert_eq!(loaded.record.state.as_deref(), Some("nonce"));
        assert_eq!(loaded.record.access_token.as_deref(), Some("shpat_abc123"));
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_record() {
        let result = operations().store(SessionRecord::new("", SHOP, false)).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    /// Memory table whose reads take a while, widening any gap between a
    /// lookup and the write that follows it.
    struct SlowReads {
        inner: MemorySessionTable,
    }

    #[async_trait]
    impl SessionTable for SlowReads {
        async fn first_by_session_id(
            &self,
            session_id: &str,
        ) -> StoreResult<Option<SessionDocument>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inner.first_by_session_id(session_id).await
        }

        async fn collect_by_shop(&self, shop: &str) -> StoreResult<Vec<SessionDocument>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inner.collect_by_shop(shop).await
        }

        async fn collect_expiring_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> StoreResult<Vec<SessionDocument>> {
            self.inner.collect_expiring_before(cutoff).await
        }

        async fn insert(&self, record: SessionRecord) -> StoreResult<DocumentId> {
            self.inner.insert(record).await
        }

        async fn upsert_by_session_id(&self, record: SessionRecord) -> StoreResult<DocumentId> {
            self.inner.upsert_by_session_id(record).await
        }

        async fn patch(&self, document_id: &DocumentId, patch: RecordPatch) -> StoreResult<bool> {
            self.inner.patch(document_id, patch).await
        }

        async fn delete(&self, document_id: &DocumentId) -> StoreResult<bool> {
            self.inner.delete(document_id).await
        }

        async fn count(&self) -> StoreResult<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_stores_keep_one_record() {
        let ops = SessionOperations::new(SlowReads {
            inner: MemorySessionTable::new(),
        });

        let (first, second) = tokio::join!(
            ops.store(SessionRecord::offline("a.myshopify.com")),
            ops.store(SessionRecord::offline("a.myshopify.com").with_access_token("shpat_second")),
        );
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(ops.table().count().await.unwrap(), 1);

        let loaded = ops
            .get_offline_by_shop("a.myshopify.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.record.access_token.as_deref(), Some("shpat_second"));
    }

    #[tokio::test]
    async fn test_delete() {
        let ops = operations();
        assert!(!ops.delete("nonexistent").await.unwrap());

        ops.store(offline()).await.unwrap();
        assert!(ops.delete(&offline().id).await.unwrap());
        assert!(ops.load(&offline().id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_many_is_partial() {
        let ops = operations();
        ops.store(offline()).await.unwrap();

        let all_found = ops
            .delete_many(&[offline().id, "nonexistent".to_string()])
            .await
            .unwrap();
        assert!(!all_found);
        assert!(ops.load(&offline().id).await.unwrap().is_none());

        ops.store(offline()).await.unwrap();
        ops.store(online()).await.unwrap();
        assert!(ops.delete_many(&[offline().id, online().id]).await.unwrap());
        assert_eq!(ops.table().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_and_offline_lookup() {
        let ops = operations();
        ops.store(online()).await.unwrap();
        assert!(ops.get_offline_by_shop(SHOP).await.unwrap().is_none());

        ops.store(offline()).await.unwrap();
        ops.store(SessionRecord::offline("other-shop.myshopify.com"))
            .await
            .unwrap();

        assert_eq!(ops.find_by_shop(SHOP).await.unwrap().len(), 2);
        let offline_doc = ops.get_offline_by_shop(SHOP).await.unwrap().unwrap();
        assert_eq!(offline_doc.record.id, offline().id);
    }

    #[tokio::test]
    async fn test_delete_by_shop() {
        let ops = operations();
        ops.store(offline()).await.unwrap();
        ops.store(online()).await.unwrap();
        ops.store(SessionRecord::offline("other-shop.myshopify.com"))
            .await
            .unwrap();

        ops.delete_by_shop(SHOP).await.unwrap();
        assert!(ops.find_by_shop(SHOP).await.unwrap().is_empty());
        assert_eq!(
            ops.find_by_shop("other-shop.myshopify.com").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let ops = operations();
        let mut expired = offline().with_expires(parse_iso("2025-05-01T00:00:00.000Z").unwrap());
        expired.id = "expired_session".to_string();
        let mut valid = offline().with_expires(parse_iso("2025-12-01T00:00:00.000Z").unwrap());
        valid.id = "valid_session".to_string();
        let mut no_expiry = offline();
        no_expiry.id = "no_expiry_session".to_string();

        for record in [expired, valid, no_expiry] {
            ops.store(record).await.unwrap();
        }

        let now = parse_iso("2025-06-01T00:00:00Z").unwrap();
        assert_eq!(ops.cleanup_expired(now).await.unwrap(), 1);
        assert!(ops.load("expired_session").await.unwrap().is_none());
        assert!(ops.load("valid_session").await.unwrap().is_some());
        assert!(ops.load("no_expiry_session").await.unwrap().is_some());
        assert_eq!(ops.cleanup_expired(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_scope() {
        let ops = operations();
        assert!(!ops.update_scope("nonexistent", "read_products").await.unwrap());
        assert_eq!(ops.table().count().await.unwrap(), 0);

        ops.store(offline()).await.unwrap();
        let updated = ops
            .update_scope(&offline().id, "read_products,write_orders,read_customers")
            .await
            .unwrap();
        assert!(updated);

        let loaded = ops.load(&offline().id).await.unwrap().unwrap();
        assert_eq!(
            loaded.record,
            offline().with_scope("read_products,write_orders,read_customers")
        );
    }

    #[tokio::test]
    async fn test_require_helpers_raise_not_found() {
        let ops = operations();
        assert!(matches!(
            ops.require_session("nonexistent").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            ops.offline_access_token(SHOP).await,
            Err(StoreError::NotFound(_))
        ));

        ops.store(SessionRecord::offline(SHOP)).await.unwrap();
        assert!(ops.offline_access_token(SHOP).await.is_err());

        ops.store(offline()).await.unwrap();
        assert_eq!(ops.offline_access_token(SHOP).await.unwrap(), "shpat_abc123");
    }
}
