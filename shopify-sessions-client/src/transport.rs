//! Transport abstraction for calling session functions by name.

use crate::error::ClientResult;
use async_trait::async_trait;
use serde_json::Value;
use shopify_sessions_store::{SessionFunctions, SessionOperations, SessionTable};
use std::sync::Arc;

/// Anything that can run a named query or mutation with JSON arguments.
///
/// Implementations decide how the call travels: [`InProcessTransport`]
/// calls the component directly, [`HttpTransport`](crate::HttpTransport)
/// posts to a function endpoint. Timeouts belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a read-only function.
    async fn query(&self, function: &str, args: Value) -> ClientResult<Value>;

    /// Run a writing function.
    async fn mutation(&self, function: &str, args: Value) -> ClientResult<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn query(&self, function: &str, args: Value) -> ClientResult<Value> {
        (**self).query(function, args).await
    }

    async fn mutation(&self, function: &str, args: Value) -> ClientResult<Value> {
        (**self).mutation(function, args).await
    }
}

/// Transport that runs functions in the caller's process, next to the
/// table.
pub struct InProcessTransport<T: ?Sized> {
    functions: SessionFunctions<T>,
}

impl<T: SessionTable + ?Sized> InProcessTransport<T> {
    pub fn new(functions: SessionFunctions<T>) -> Self {
        Self { functions }
    }

    /// Transport over a fresh dispatcher for `operations`.
    pub fn from_operations(operations: SessionOperations<T>) -> Self {
        Self::new(SessionFunctions::new(operations))
    }

    pub fn functions(&self) -> &SessionFunctions<T> {
        &self.functions
    }
}

impl<T: SessionTable> InProcessTransport<T> {
    /// Transport over a table.
    pub fn for_table(table: T) -> Self {
        Self::from_operations(SessionOperations::new(table))
    }
}

#[async_trait]
impl<T: SessionTable + ?Sized> Transport for InProcessTransport<T> {
    async fn query(&self, function: &str, args: Value) -> ClientResult<Value> {
        Ok(self.functions.query(function, args).await?)
    }

    async fn mutation(&self, function: &str, args: Value) -> ClientResult<Value> {
        Ok(self.functions.mutation(function, args).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use serde_json::json;
    use shopify_sessions_store::{MemorySessionTable, StoreError};

    #[tokio::test]
    async fn test_in_process_round_trip() {
        let transport = InProcessTransport::for_table(MemorySessionTable::new());
        transport
            .mutation(
                "lib:storeSession",
                json!({ "id": "offline_a.myshopify.com", "shop": "a.myshopify.com", "isOnline": false }),
            )
            .await
            .unwrap();

        let found = transport
            .query("lib:findSessionsByShop", json!({ "shop": "a.myshopify.com" }))
            .await
            .unwrap();
        assert_eq!(found.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_store_errors_pass_through() {
        let transport: Arc<dyn Transport> =
            Arc::new(InProcessTransport::for_table(MemorySessionTable::new()));

        let result = transport.query("lib:nothing", json!({})).await;
        assert!(matches!(
            result,
            Err(ClientError::Store(StoreError::UnknownFunction(_)))
        ));
    }
}
