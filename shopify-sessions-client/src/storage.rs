//! Session storage traits and the storage backed by the session client.

use crate::adapter::SessionClient;
use crate::convert::{from_store_shape, to_store_shape};
use crate::error::ClientResult;
use crate::session::Session;
use crate::transport::Transport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Session storage capability expected by Shopify OAuth libraries.
///
/// # Examples
///
/// ```ignore
/// use shopify_sessions_client::{Session, SessionStorage};
///
/// async fn remember(storage: &impl SessionStorage, session: Session) -> ClientResult<()> {
///     storage.store_session(&session).await?;
///
///     let loaded = storage.load_session(&session.id).await?;
///     assert_eq!(loaded.map(|s| s.shop), Some(session.shop));
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Insert or replace a session by id.
    ///
    /// # Returns
    ///
    /// Returns `true` once the session is stored.
    async fn store_session(&self, session: &Session) -> ClientResult<bool>;

    /// Get a session by id.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if no session is stored under `id`.
    async fn load_session(&self, id: &str) -> ClientResult<Option<Session>>;

    /// Delete a session by id.
    ///
    /// # Returns
    ///
    /// Returns `false` if no session was stored under `id`.
    async fn delete_session(&self, id: &str) -> ClientResult<bool>;

    /// Delete several sessions.
    ///
    /// # Returns
    ///
    /// Returns `true` only when every id existed. Existing sessions are
    /// removed either way.
    async fn delete_sessions(&self, ids: &[String]) -> ClientResult<bool>;

    /// Get every session stored for a shop.
    async fn find_sessions_by_shop(&self, shop: &str) -> ClientResult<Vec<Session>>;

    /// Remove sessions that expired before `now`.
    ///
    /// The default implementation removes nothing.
    async fn cleanup_expired_sessions(&self, now: Option<DateTime<Utc>>) -> ClientResult<usize> {
        let _ = now;
        Ok(0)
    }
}

/// Shop-level extras on top of [`SessionStorage`].
#[async_trait]
pub trait ShopSessionStorage: SessionStorage {
    /// Get the offline session of a shop.
    async fn get_offline_session_by_shop(&self, shop: &str) -> ClientResult<Option<Session>>;

    /// Delete every session of a shop.
    async fn delete_sessions_by_shop(&self, shop: &str) -> ClientResult<()>;

    /// Replace the scope of a session.
    ///
    /// # Returns
    ///
    /// Returns `false` if no session is stored under `id`.
    async fn update_scopes(&self, id: &str, scope: &str) -> ClientResult<bool>;
}

/// [`SessionStorage`] over a [`SessionClient`].
///
/// Converts between [`Session`] and the stored record and hands each call to
/// the client. Failure handling follows the client's policy.
pub struct ComponentStorage<T> {
    client: SessionClient<T>,
}

impl<T: Transport> ComponentStorage<T> {
    pub fn new(client: SessionClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SessionClient<T> {
        &self.client
    }
}

#[async_trait]
impl<T: Transport> SessionStorage for ComponentStorage<T> {
    async fn store_session(&self, session: &Session) -> ClientResult<bool> {
        self.client.store_session(&to_store_shape(session)).await
    }

    async fn load_session(&self, id: &str) -> ClientResult<Option<Session>> {
        Ok(self.client.load_session(id).await?.map(from_store_shape))
    }

    async fn delete_session(&self, id: &str) -> ClientResult<bool> {
        self.client.delete_session(id).await
    }

    async fn delete_sessions(&self, ids: &[String]) -> ClientResult<bool> {
        self.client.delete_sessions(ids).await
    }

    async fn find_sessions_by_shop(&self, shop: &str) -> ClientResult<Vec<Session>> {
        let records = self.client.find_sessions_by_shop(shop).await?;
        Ok(records.into_iter().map(from_store_shape).collect())
    }

    async fn cleanup_expired_sessions(&self, now: Option<DateTime<Utc>>) -> ClientResult<usize> {
        self.client.cleanup_expired_sessions(now).await
    }
}

#[async_trait]
impl<T: Transport> ShopSessionStorage for ComponentStorage<T> {
    async fn get_offline_session_by_shop(&self, shop: &str) -> ClientResult<Option<Session>> {
        Ok(self
            .client
            .get_offline_session_by_shop(shop)
            .await?
            .map(from_store_shape))
    }

    async fn delete_sessions_by_shop(&self, shop: &str) -> ClientResult<()> {
        self.client.delete_sessions_by_shop(shop).await
    }

    async fn update_scopes(&self, id: &str, scope: &str) -> ClientResult<bool> {
        self.client.update_scopes(id, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::session::SessionAccessInfo;
    use crate::transport::InProcessTransport;
    use chrono::Duration;
    use shopify_sessions_store::{AssociatedUser, MemorySessionTable, parse_iso};

    fn storage() -> ComponentStorage<InProcessTransport<MemorySessionTable>> {
        ComponentStorage::new(
            SessionClient::new(InProcessTransport::for_table(MemorySessionTable::new()))
                .with_failure_policy(FailurePolicy::Propagate),
        )
    }

    fn online_session() -> Session {
        Session::online("test-shop.myshopify.com", 1)
            .with_state("nonce-123")
            .with_scope("read_products")
            .with_access_token("shpua_xyz")
            .with_expires(parse_iso("2025-06-01T00:00:00.250Z").unwrap())
            .with_online_access_info(SessionAccessInfo {
                expires_in: 86400,
                associated_user_scope: "read_products".to_string(),
                associated_user: Some(AssociatedUser {
                    id: 1,
                    first_name: "Test".to_string(),
                    last_name: "User".to_string(),
                    email: "test@example.com".to_string(),
                    account_owner: true,
                    locale: "en".to_string(),
                    collaborator: false,
                    email_verified: true,
                }),
            })
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let storage = storage();
        let session = online_session();

        assert!(storage.store_session(&session).await.unwrap());
        assert_eq!(storage.load_session(&session.id).await.unwrap(), Some(session));
        assert_eq!(storage.load_session("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_and_delete() {
        let storage = storage();
        let offline = Session::offline("test-shop.myshopify.com").with_access_token("shpat_abc");
        storage.store_session(&offline).await.unwrap();
        storage.store_session(&online_session()).await.unwrap();

        let found = storage
            .find_sessions_by_shop("test-shop.myshopify.com")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let fetched = storage
            .get_offline_session_by_shop("test-shop.myshopify.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.access_token.as_deref(), Some("shpat_abc"));

        assert!(storage.delete_session(&offline.id).await.unwrap());
        assert!(!storage.delete_session(&offline.id).await.unwrap());

        storage
            .delete_sessions_by_shop("test-shop.myshopify.com")
            .await
            .unwrap();
        assert!(
            storage
                .find_sessions_by_shop("test-shop.myshopify.com")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_cleanup_and_update_scopes() {
        let storage = storage();
        let session = online_session();
        storage.store_session(&session).await.unwrap();

        assert!(storage.update_scopes(&session.id, "write_products").await.unwrap());
        let loaded = storage.load_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.scope.as_deref(), Some("write_products"));
        assert_eq!(loaded.access_token, session.access_token);

        let expires = session.expires.unwrap();
        let removed = storage
            .cleanup_expired_sessions(Some(expires + Duration::seconds(1)))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.load_session(&session.id).await.unwrap(), None);
    }

    struct NoCleanup;

    #[async_trait]
    impl SessionStorage for NoCleanup {
        async fn store_session(&self, _session: &Session) -> ClientResult<bool> {
            Ok(true)
        }

        async fn load_session(&self, _id: &str) -> ClientResult<Option<Session>> {
            Ok(None)
        }

        async fn delete_session(&self, _id: &str) -> ClientResult<bool> {
            Ok(false)
        }

        async fn delete_sessions(&self, _ids: &[String]) -> ClientResult<bool> {
            Ok(false)
        }

        async fn find_sessions_by_shop(&self, _shop: &str) -> ClientResult<Vec<Session>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cleanup_defaults_to_nothing() {
        assert_eq!(NoCleanup.cleanup_expired_sessions(None).await.unwrap(), 0);
    }
}
