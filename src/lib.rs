// shopify-sessions - Shopify app session storage
//
// Stores Shopify OAuth sessions in a document table, exposes the session
// operations as named functions and provides a SessionStorage client on top.

// Re-export member crates
pub use shopify_sessions_client as client;
pub use shopify_sessions_log as log;
pub use shopify_sessions_store as store;

pub use shopify_sessions_client::{
    AuthScopes, ClientConfig, ClientError, ClientResult, ComponentStorage, FailurePolicy,
    FunctionRefs, InProcessTransport, Session, SessionAccessInfo, SessionClient, SessionStorage,
    ShopSessionStorage, Transport,
};
pub use shopify_sessions_store::{
    MemorySessionTable, SessionFunctions, SessionOperations, SessionRecord, SessionTable,
    StoreConfig, StoreError, StoreResult,
};

#[cfg(feature = "couchdb")]
pub use shopify_sessions_store::CouchDbSessionTable;

#[cfg(feature = "http")]
pub use shopify_sessions_client::HttpTransport;

/// Session storage running next to the table described by `config`.
///
/// The session functions run in process; failures propagate to the caller.
pub async fn in_process(
    config: StoreConfig,
) -> StoreResult<ComponentStorage<InProcessTransport<dyn SessionTable>>> {
    let table = shopify_sessions_store::connect(config).await?;
    let transport = InProcessTransport::from_operations(SessionOperations::from_arc(table));
    Ok(ComponentStorage::new(
        SessionClient::new(transport).with_failure_policy(FailurePolicy::Propagate),
    ))
}

/// Session storage for the remote deployment described by `config`.
#[cfg(feature = "http")]
pub fn remote(config: &ClientConfig) -> ClientResult<ComponentStorage<HttpTransport>> {
    shopify_sessions_client::connect(config)
}

/// Read logging settings from the environment. Call once at startup.
pub fn init_logging() {
    shopify_sessions_log::init();
}

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AuthScopes, ClientConfig, ClientError, ClientResult, ComponentStorage, FailurePolicy,
        InProcessTransport, MemorySessionTable, Session, SessionClient, SessionRecord,
        SessionStorage, SessionTable, ShopSessionStorage, StoreConfig, StoreError, Transport,
    };

    #[cfg(feature = "http")]
    pub use crate::HttpTransport;

    #[cfg(feature = "couchdb")]
    pub use crate::CouchDbSessionTable;
}
