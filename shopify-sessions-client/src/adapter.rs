//! Session client: calls the session functions through a [`Transport`].

use crate::config::{ClientConfig, FailurePolicy, FunctionRefs};
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shopify_sessions_log::{debug, error};
use shopify_sessions_store::{SessionRecord, to_iso_millis};

/// Typed client for the session functions.
///
/// Every method addresses one remote function from [`FunctionRefs`]. When a
/// call fails, the [`FailurePolicy`] decides the outcome: `Degrade` logs the
/// failure and returns the method's empty result (`false`, `None`, an empty
/// list, `0`), `Propagate` returns the error.
///
/// # Examples
///
/// ```
/// use shopify_sessions_client::{FailurePolicy, InProcessTransport, SessionClient};
/// use shopify_sessions_store::{MemorySessionTable, SessionRecord};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), shopify_sessions_client::ClientError> {
/// let client = SessionClient::new(InProcessTransport::for_table(MemorySessionTable::new()))
///     .with_failure_policy(FailurePolicy::Propagate);
///
/// client
///     .store_session(&SessionRecord::offline("example.myshopify.com").with_access_token("shpat_abc"))
///     .await?;
///
/// let offline = client.get_offline_session_by_shop("example.myshopify.com").await?;
/// assert_eq!(offline.unwrap().access_token.as_deref(), Some("shpat_abc"));
/// # Ok(())
/// # }
/// ```
pub struct SessionClient<T> {
    transport: T,
    functions: FunctionRefs,
    failure_policy: FailurePolicy,
}

impl<T: Transport> SessionClient<T> {
    /// Create a client with the default function names and `Degrade`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            functions: FunctionRefs::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Create a client using the function names and policy of `config`.
    pub fn from_config(transport: T, config: &ClientConfig) -> Self {
        Self::new(transport)
            .with_functions(config.functions.clone())
            .with_failure_policy(config.failure_policy)
    }

    pub fn with_functions(mut self, functions: FunctionRefs) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn functions(&self) -> &FunctionRefs {
        &self.functions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Insert or replace a session by id. `true` once stored.
    pub async fn store_session(&self, record: &SessionRecord) -> ClientResult<bool> {
        let result = async {
            let args = encode(record)?;
            self.transport
                .mutation(&self.functions.store_session, args)
                .await?;
            Ok::<_, ClientError>(true)
        }
        .await;

        self.settle("store session", result)
    }

    pub async fn load_session(&self, id: &str) -> ClientResult<Option<SessionRecord>> {
        let result = self.run_query(&self.functions.load_session, json!({ "id": id })).await;
        self.settle("load session", result)
    }

    /// Delete a session. `false` when nothing was stored under `id`.
    pub async fn delete_session(&self, id: &str) -> ClientResult<bool> {
        let result = self
            .run_mutation(&self.functions.delete_session, json!({ "id": id }))
            .await;
        self.settle("delete session", result)
    }

    /// Delete several sessions. `true` only when every id existed.
    ///
    /// Sessions that existed are removed even when the result is `false`.
    pub async fn delete_sessions(&self, ids: &[String]) -> ClientResult<bool> {
        let result = self
            .run_mutation(&self.functions.delete_sessions, json!({ "ids": ids }))
            .await;
        self.settle("delete sessions", result)
    }

    pub async fn find_sessions_by_shop(&self, shop: &str) -> ClientResult<Vec<SessionRecord>> {
        let result = self
            .run_query(&self.functions.find_sessions_by_shop, json!({ "shop": shop }))
            .await;
        self.settle("find sessions by shop", result)
    }

    pub async fn get_offline_session_by_shop(
        &self,
        shop: &str,
    ) -> ClientResult<Option<SessionRecord>> {
        let result = self
            .run_query(
                &self.functions.get_offline_session_by_shop,
                json!({ "shop": shop }),
            )
            .await;
        self.settle("get offline session by shop", result)
    }

    pub async fn delete_sessions_by_shop(&self, shop: &str) -> ClientResult<()> {
        let result = self
            .transport
            .mutation(&self.functions.delete_sessions_by_shop, json!({ "shop": shop }))
            .await
            .map(|_| ());
        self.settle("delete sessions by shop", result)
    }

    /// Remove sessions that expired before `now` (the backend's clock when
    /// `None`). Returns how many were removed.
    pub async fn cleanup_expired_sessions(
        &self,
        now: Option<DateTime<Utc>>,
    ) -> ClientResult<usize> {
        let args = match now {
            Some(now) => json!({ "now": to_iso_millis(&now) }),
            None => json!({}),
        };
        let result = self
            .run_mutation(&self.functions.cleanup_expired_sessions, args)
            .await;
        self.settle("clean up expired sessions", result)
    }

    /// Replace a session's scope. `false` when the session does not exist.
    pub async fn update_scopes(&self, id: &str, scope: &str) -> ClientResult<bool> {
        let result = self
            .run_mutation(
                &self.functions.update_scopes,
                json!({ "id": id, "scope": scope }),
            )
            .await;
        self.settle("update scopes", result)
    }

    async fn run_query<V: DeserializeOwned>(&self, function: &str, args: Value) -> ClientResult<V> {
        debug!("query {}", function);
        let value = self.transport.query(function, args).await?;
        decode(function, value)
    }

    async fn run_mutation<V: DeserializeOwned>(&self, function: &str, args: Value) -> ClientResult<V> {
        debug!("mutation {}", function);
        let value = self.transport.mutation(function, args).await?;
        decode(function, value)
    }

    fn settle<V: Default>(&self, operation: &str, result: ClientResult<V>) -> ClientResult<V> {
        match (result, self.failure_policy) {
            (Ok(value), _) => Ok(value),
            (Err(e), FailurePolicy::Degrade) => {
                error!("Failed to {}: {}", operation, e);
                Ok(V::default())
            }
            (Err(e), FailurePolicy::Propagate) => Err(e),
        }
    }
}

fn encode<A: Serialize>(args: &A) -> ClientResult<Value> {
    serde_json::to_value(args).map_err(|e| ClientError::Serialization(e.to_string()))
}

fn decode<V: DeserializeOwned>(function: &str, value: Value) -> ClientResult<V> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Deserialization(format!("{}: {}", function, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessTransport;
    use async_trait::async_trait;
    use shopify_sessions_store::{MemorySessionTable, parse_iso};
    use std::sync::Mutex;

    /// Transport that records calls and fails every one of them.
    #[derive(Default)]
    struct BrokenTransport {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn query(&self, function: &str, _args: Value) -> ClientResult<Value> {
            self.calls.lock().unwrap().push(function.to_string());
            Err(ClientError::Transport("connection reset".to_string()))
        }

        async fn mutation(&self, function: &str, _args: Value) -> ClientResult<Value> {
            self.calls.lock().unwrap().push(function.to_string());
            Err(ClientError::Transport("connection reset".to_string()))
        }
    }

    /// Transport answering every call with a fixed value.
    struct FixedTransport(Value);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn query(&self, _function: &str, _args: Value) -> ClientResult<Value> {
            Ok(self.0.clone())
        }

        async fn mutation(&self, _function: &str, _args: Value) -> ClientResult<Value> {
            Ok(self.0.clone())
        }
    }

    fn client() -> SessionClient<InProcessTransport<MemorySessionTable>> {
        SessionClient::new(InProcessTransport::for_table(MemorySessionTable::new()))
            .with_failure_policy(FailurePolicy::Propagate)
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let client = client();
        let record = SessionRecord::offline("a.myshopify.com")
            .with_scope("read_products")
            .with_access_token("shpat_abc");

        assert!(client.store_session(&record).await.unwrap());
        assert_eq!(client.load_session(&record.id).await.unwrap(), Some(record));
        assert_eq!(client.load_session("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shop_operations() {
        let client = client();
        client
            .store_session(&SessionRecord::offline("a.myshopify.com"))
            .await
            .unwrap();
        client
            .store_session(&SessionRecord::new("a.myshopify.com_1", "a.myshopify.com", true))
            .await
            .unwrap();

        assert_eq!(client.find_sessions_by_shop("a.myshopify.com").await.unwrap().len(), 2);
        assert!(
            client
                .get_offline_session_by_shop("a.myshopify.com")
                .await
                .unwrap()
                .is_some()
        );

        client.delete_sessions_by_shop("a.myshopify.com").await.unwrap();
        assert!(client.find_sessions_by_shop("a.myshopify.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_update() {
        let client = client();
        client
            .store_session(&SessionRecord::offline("a.myshopify.com").with_scope("read_products"))
            .await
            .unwrap();

        assert!(client.update_scopes("offline_a.myshopify.com", "write_products").await.unwrap());
        assert!(!client.update_scopes("missing", "write_products").await.unwrap());

        let ids = vec!["offline_a.myshopify.com".to_string(), "missing".to_string()];
        assert!(!client.delete_sessions(&ids).await.unwrap());
        assert!(!client.delete_session("offline_a.myshopify.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_with_explicit_now() {
        let client = client();
        client
            .store_session(
                &SessionRecord::offline("a.myshopify.com")
                    .with_expires(parse_iso("2025-05-01T00:00:00Z").unwrap()),
            )
            .await
            .unwrap();

        let now = parse_iso("2025-06-01T00:00:00Z").unwrap();
        assert_eq!(client.cleanup_expired_sessions(Some(now)).await.unwrap(), 1);
        assert_eq!(client.cleanup_expired_sessions(Some(now)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_degrade_returns_defaults() {
        let client = SessionClient::new(BrokenTransport::default());
        assert_eq!(client.failure_policy(), FailurePolicy::Degrade);

        let record = SessionRecord::offline("a.myshopify.com");
        assert!(!client.store_session(&record).await.unwrap());
        assert_eq!(client.load_session("x").await.unwrap(), None);
        assert!(!client.delete_session("x").await.unwrap());
        assert!(!client.delete_sessions(&["x".to_string()]).await.unwrap());
        assert!(client.find_sessions_by_shop("s").await.unwrap().is_empty());
        assert_eq!(client.get_offline_session_by_shop("s").await.unwrap(), None);
        client.delete_sessions_by_shop("s").await.unwrap();
        assert_eq!(client.cleanup_expired_sessions(None).await.unwrap(), 0);
        assert!(!client.update_scopes("x", "read_products").await.unwrap());

        assert_eq!(client.transport().calls.lock().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_propagate_returns_errors() {
        let client = SessionClient::new(BrokenTransport::default())
            .with_failure_policy(FailurePolicy::Propagate);

        assert!(matches!(
            client.load_session("x").await,
            Err(ClientError::Transport(_))
        ));
        assert!(matches!(
            client.store_session(&SessionRecord::offline("s")).await,
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_result_shape() {
        let client = SessionClient::new(FixedTransport(json!("surprise")))
            .with_failure_policy(FailurePolicy::Propagate);
        assert!(matches!(
            client.delete_session("x").await,
            Err(ClientError::Deserialization(_))
        ));

        let degraded = SessionClient::new(FixedTransport(json!("surprise")));
        assert!(degraded.find_sessions_by_shop("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_function_module() {
        let client = SessionClient::new(BrokenTransport::default())
            .with_functions(FunctionRefs::with_module("sessions"));
        client.load_session("x").await.unwrap();
        assert_eq!(
            client.transport().calls.lock().unwrap().as_slice(),
            ["sessions:loadSession".to_string()]
        );
    }
}
