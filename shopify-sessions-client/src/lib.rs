//! Session storage client for Shopify apps.
//!
//! Connects Shopify OAuth code to the session functions of
//! `shopify-sessions-store`:
//!
//! - [`Transport`] runs a named query or mutation. [`InProcessTransport`]
//!   calls the functions directly; [`HttpTransport`] (feature `http`, on by
//!   default) posts them to a deployment.
//! - [`SessionClient`] calls each session function through a transport and
//!   applies a [`FailurePolicy`].
//! - [`ComponentStorage`] implements [`SessionStorage`] and
//!   [`ShopSessionStorage`] for [`Session`] values on top of a client.
//!
//! # Examples
//!
//! ```
//! use shopify_sessions_client::*;
//! use shopify_sessions_store::MemorySessionTable;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ClientError> {
//! let client = SessionClient::new(InProcessTransport::for_table(MemorySessionTable::new()));
//! let storage = ComponentStorage::new(client);
//!
//! let session = Session::offline("example.myshopify.com")
//!     .with_scope("write_products")
//!     .with_access_token("shpat_abc123");
//! storage.store_session(&session).await?;
//!
//! let loaded = storage.load_session(&session.id).await?.unwrap();
//! assert!(loaded.is_active(&AuthScopes::new("read_products,write_products")));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod convert;
pub mod error;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

pub use adapter::SessionClient;
pub use config::{ClientConfig, FailurePolicy, FunctionRefs};
pub use convert::{from_store_shape, to_store_shape};
pub use error::{ClientError, ClientResult};
pub use session::{ACTIVE_EXPIRY_WINDOW, AuthScopes, Session, SessionAccessInfo};
pub use storage::{ComponentStorage, SessionStorage, ShopSessionStorage};
pub use transport::{InProcessTransport, Transport};

#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Session storage talking to the deployment described by `config`.
#[cfg(feature = "http")]
pub fn connect(config: &ClientConfig) -> ClientResult<ComponentStorage<HttpTransport>> {
    let transport = HttpTransport::new(config)?;
    Ok(ComponentStorage::new(SessionClient::from_config(
        transport, config,
    )))
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapter::SessionClient;
    pub use crate::config::{ClientConfig, FailurePolicy};
    pub use crate::error::{ClientError, ClientResult};
    pub use crate::session::{AuthScopes, Session};
    pub use crate::storage::{ComponentStorage, SessionStorage, ShopSessionStorage};
    pub use crate::transport::{InProcessTransport, Transport};

    #[cfg(feature = "http")]
    pub use crate::http::HttpTransport;
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_connect_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "value": [
                    { "_id": "d1", "_creationTime": 1.0, "id": "offline_a.myshopify.com", "shop": "a.myshopify.com", "isOnline": false },
                    { "_id": "d2", "_creationTime": 2.0, "id": "a.myshopify.com_1", "shop": "a.myshopify.com", "isOnline": true, "state": "nonce" }
                ]
            })))
            .mount(&server)
            .await;

        let config = ClientConfig::new(&server.uri())
            .unwrap()
            .with_failure_policy(FailurePolicy::Propagate);
        let storage = connect(&config).unwrap();

        let sessions = storage
            .find_sessions_by_shop("a.myshopify.com")
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].state, "");
        assert_eq!(sessions[1].state, "nonce");
    }
}
