//! Shopify app session storage.
//!
//! Persists Shopify OAuth sessions (access tokens, scopes and shop
//! metadata) in a document table and exposes the session operations used by
//! Shopify session storage adapters.
//!
//! - [`SessionRecord`] is the stored shape of a session.
//! - [`SessionTable`] is the backing document table. [`MemorySessionTable`]
//!   is always available; [`CouchDbSessionTable`] needs the `couchdb`
//!   feature (enabled by default).
//! - [`SessionOperations`] implements upsert, lookup, delete and expiry
//!   cleanup over any table.
//! - [`SessionFunctions`] exposes those operations as named queries and
//!   mutations taking JSON arguments.
//!
//! # Examples
//!
//! ```
//! use shopify_sessions_store::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), StoreError> {
//! let sessions = SessionOperations::new(MemorySessionTable::new());
//!
//! let record = SessionRecord::offline("example.myshopify.com")
//!     .with_scope("read_products")
//!     .with_access_token("shpat_abc123");
//! sessions.store(record).await?;
//!
//! // Storing the same id again updates in place.
//! sessions
//!     .store(SessionRecord::offline("example.myshopify.com").with_access_token("shpat_new"))
//!     .await?;
//!
//! let offline = sessions.get_offline_by_shop("example.myshopify.com").await?.unwrap();
//! assert_eq!(offline.record.access_token.as_deref(), Some("shpat_new"));
//! assert_eq!(offline.record.scope.as_deref(), Some("read_products"));
//!
//! assert!(sessions.delete(&offline_session_id("example.myshopify.com")).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod functions;
pub mod memory;
pub mod operations;
pub mod schema;
pub mod table;

#[cfg(feature = "couchdb")]
pub mod couchdb;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use functions::{FunctionKind, SessionFunction, SessionFunctions};
pub use memory::MemorySessionTable;
pub use operations::SessionOperations;
pub use schema::{
    AssociatedUser, DocumentId, OnlineAccessInfo, RecordPatch, SessionDocument, SessionRecord,
    offline_session_id, online_session_id, parse_iso, to_iso_millis,
};
pub use table::SessionTable;

#[cfg(feature = "couchdb")]
pub use couchdb::CouchDbSessionTable;

use std::sync::Arc;

/// Open the table described by `config`.
pub async fn connect(config: StoreConfig) -> StoreResult<Arc<dyn SessionTable>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemorySessionTable::new())),
        #[cfg(feature = "couchdb")]
        StoreBackend::CouchDb => Ok(Arc::new(CouchDbSessionTable::new(config).await?)),
        #[cfg(not(feature = "couchdb"))]
        StoreBackend::CouchDb => Err(StoreError::Config(
            "CouchDB backend requires the `couchdb` feature".to_string(),
        )),
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{StoreBackend, StoreConfig};
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::functions::{SessionFunction, SessionFunctions};
    pub use crate::memory::MemorySessionTable;
    pub use crate::operations::SessionOperations;
    pub use crate::schema::{OnlineAccessInfo, SessionDocument, SessionRecord};
    pub use crate::table::SessionTable;

    #[cfg(feature = "couchdb")]
    pub use crate::couchdb::CouchDbSessionTable;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let table = connect(StoreConfig::memory()).await.unwrap();
        let sessions = SessionOperations::from_arc(table);
        sessions
            .store(SessionRecord::offline("a.myshopify.com"))
            .await
            .unwrap();
        assert_eq!(sessions.table().count().await.unwrap(), 1);
    }
}
