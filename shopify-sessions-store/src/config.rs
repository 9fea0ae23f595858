//! Store configuration.

use crate::error::{StoreError, StoreResult};
use std::env;

/// Table backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process memory table
    Memory,
    /// CouchDB database over HTTP
    CouchDb,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend type
    pub backend: StoreBackend,
    /// Server URL (CouchDB only)
    pub url: Option<String>,
    /// Database name (CouchDB only)
    pub database: Option<String>,
    /// Prefix for document ids, so one database can hold several apps
    pub namespace: String,
    /// CouchDB username
    pub username: Option<String>,
    /// CouchDB password
    pub password: Option<String>,
    /// Documents fetched per `_find` page
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            database: None,
            namespace: "shopify_session".to_string(),
            username: None,
            password: None,
            page_size: 200,
        }
    }
}

impl StoreConfig {
    /// Configuration for the in-memory table.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a CouchDB configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use shopify_sessions_store::StoreConfig;
    ///
    /// let config = StoreConfig::couchdb("http://localhost:5984", "sessions").unwrap();
    /// assert_eq!(config.database.as_deref(), Some("sessions"));
    /// ```
    pub fn couchdb(url: &str, database: &str) -> StoreResult<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(StoreError::InvalidUrl(
                "CouchDB URL must start with http:// or https://".to_string(),
            ));
        }
        if database.trim().is_empty() {
            return Err(StoreError::Config(
                "CouchDB database name is required".to_string(),
            ));
        }

        Ok(Self {
            backend: StoreBackend::CouchDb,
            url: Some(url.trim_end_matches('/').to_string()),
            database: Some(database.to_string()),
            ..Default::default()
        })
    }

    /// Read configuration from the environment.
    ///
    /// - `SHOPIFY_SESSIONS_BACKEND` - `memory` (default) or `couchdb`
    /// - `SHOPIFY_SESSIONS_COUCHDB_URL` - required for `couchdb`
    /// - `SHOPIFY_SESSIONS_COUCHDB_DATABASE` - default `shopify_sessions`
    /// - `SHOPIFY_SESSIONS_COUCHDB_USER` / `SHOPIFY_SESSIONS_COUCHDB_PASSWORD`
    /// - `SHOPIFY_SESSIONS_NAMESPACE`
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("SHOPIFY_SESSIONS_BACKEND").unwrap_or_else(|| "memory".to_string());

        let mut config = match backend.trim().to_lowercase().as_str() {
            "memory" => Self::memory(),
            "couchdb" => {
                let url = lookup("SHOPIFY_SESSIONS_COUCHDB_URL").ok_or_else(|| {
                    StoreError::Config("SHOPIFY_SESSIONS_COUCHDB_URL is not set".to_string())
                })?;
                let database = lookup("SHOPIFY_SESSIONS_COUCHDB_DATABASE")
                    .unwrap_or_else(|| "shopify_sessions".to_string());
                let mut config = Self::couchdb(&url, &database)?;
                if let (Some(user), Some(password)) = (
                    lookup("SHOPIFY_SESSIONS_COUCHDB_USER"),
                    lookup("SHOPIFY_SESSIONS_COUCHDB_PASSWORD"),
                ) {
                    config = config.with_auth(&user, &password);
                }
                config
            }
            other => {
                return Err(StoreError::Config(format!(
                    "Unknown session backend '{}'",
                    other
                )));
            }
        };

        if let Some(namespace) = lookup("SHOPIFY_SESSIONS_NAMESPACE") {
            config = config.with_namespace(&namespace);
        }

        Ok(config)
    }

    /// Set the document id prefix.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set CouchDB credentials.
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set the `_find` page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Namespaced document key.
    pub fn document_key(&self, suffix: &str) -> String {
        format!("{}:{}", self.namespace, suffix)
    }
}
