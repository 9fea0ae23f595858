//! CouchDB session table.
//!
//! This module requires the `couchdb` feature flag.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    DocumentId, RecordPatch, SessionDocument, SessionRecord, next_creation_time, to_iso_millis,
};
use crate::table::SessionTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, IntoUrl, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shopify_sessions_log::{debug, info};

/// CouchDB reserves top-level `_` fields, so the creation time is stored
/// without the prefix and mapped onto [`SessionDocument::creation_time`].
#[derive(Debug, Serialize, Deserialize)]
struct CouchDbDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(rename = "creationTime")]
    creation_time: f64,
    #[serde(flatten)]
    record: SessionRecord,
}

impl From<CouchDbDocument> for SessionDocument {
    fn from(doc: CouchDbDocument) -> Self {
        Self {
            document_id: DocumentId::from(doc.id),
            creation_time: doc.creation_time,
            record: doc.record,
        }
    }
}

/// Mango indexes created on connect: (name, field).
const INDEXES: [(&str, &str); 3] = [
    ("by_session_id", "id"),
    ("by_shop", "shop"),
    ("by_expires", "expires"),
];

/// Rounds of read-then-write before an upsert gives up on conflicts.
const UPSERT_ATTEMPTS: usize = 5;

/// CouchDB-backed session table.
///
/// Upserted documents are keyed `{namespace}:{session id}`, so two writers
/// racing on one session collide on the same key and the loser re-reads.
/// Plain inserts are keyed `{namespace}:{uuid}`. Documents are queried
/// through Mango `_find` selectors on `id`, `shop` and `expires`. The
/// matching indexes are created when the table connects.
///
/// # Examples
///
/// ```ignore
/// use shopify_sessions_store::{CouchDbSessionTable, SessionOperations, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = StoreConfig::couchdb("http://localhost:5984", "sessions")?
///         .with_namespace("myapp")
///         .with_auth("admin", "password");
///
///     let sessions = SessionOperations::new(CouchDbSessionTable::new(config).await?);
///     let removed = sessions.cleanup_expired(chrono::Utc::now()).await?;
///     println!("removed {removed} expired sessions");
///     Ok(())
/// }
/// ```
pub struct CouchDbSessionTable {
    client: Client,
    config: StoreConfig,
    base_url: String,
}

impl CouchDbSessionTable {
    /// Connect to the configured database and ensure its indexes exist.
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| StoreError::Config("CouchDB URL is required".to_string()))?;
        let database = config
            .database
            .clone()
            .ok_or_else(|| StoreError::Config("CouchDB database name is required".to_string()))?;

        let base_url = format!("{}/{}", url.trim_end_matches('/'), database);

        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let table = Self {
            client,
            config,
            base_url,
        };

        let response = table
            .request(Method::HEAD, &table.base_url)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Connection(format!(
                "Failed to connect to CouchDB database '{}': {}",
                database,
                response.status()
            )));
        }

        table.ensure_indexes().await?;
        info!("Connected to CouchDB session database '{}'", database);

        Ok(table)
    }

    /// Build an authenticated request.
    fn request(&self, method: Method, url: impl IntoUrl) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(username, Some(password));
        }

        request
    }

    /// Document URL with the id percent-encoded as one path segment.
    fn document_url(&self, document_id: &str) -> StoreResult<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.clone()))?
            .push(document_id);
        Ok(url)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let url = format!("{}/_index", self.base_url);

        for (name, field) in INDEXES {
            let body = json!({
                "index": { "fields": [field] },
                "name": name,
                "type": "json",
            });

            let response = self
                .request(Method::POST, &url)
                .json(&body)
                .send()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            if !response.status().is_success() {
                return Err(StoreError::CouchDb(format!(
                    "Failed to create index {}: {}",
                    name,
                    response.status()
                )));
            }
        }

        Ok(())
    }

    /// Restrict a selector to this table's namespace.
    fn scoped(&self, mut selector: Value) -> Value {
        let prefix = self.config.document_key("");
        selector["_id"] = json!({
            "$gt": prefix,
            "$lt": format!("{}\u{fff0}", prefix),
        });
        selector
    }

    /// Run a `_find` query, following bookmarks until every page is read.
    /// Results are ordered by creation time, then by document id.
    async fn find(&self, selector: Value) -> StoreResult<Vec<CouchDbDocument>> {
        #[derive(Deserialize)]
        struct FindResponse {
            docs: Vec<CouchDbDocument>,
            #[serde(default)]
            bookmark: Option<String>,
        }

        let selector = self.scoped(selector);
        let url = format!("{}/_find", self.base_url);
        let mut documents = Vec::new();
        let mut bookmark: Option<String> = None;

        loop {
            let mut body = json!({
                "selector": selector,
                "limit": self.config.page_size,
            });
            if let Some(bookmark) = &bookmark {
                body["bookmark"] = json!(bookmark);
            }

            let response = self
                .request(Method::POST, &url)
                .json(&body)
                .send()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            if !response.status().is_success() {
                return Err(StoreError::CouchDb(format!(
                    "Failed to query sessions: {}",
                    response.status()
                )));
            }

            let page: FindResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;

            let fetched = page.docs.len();
            documents.extend(page.docs);

            if fetched < self.config.page_size {
                break;
            }
            match page.bookmark {
                Some(next) if bookmark.as_ref() != Some(&next) => bookmark = Some(next),
                _ => break,
            }
        }

        documents.sort_by(|a, b| {
            a.creation_time
                .total_cmp(&b.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(documents)
    }

    async fn get_document(&self, document_id: &str) -> StoreResult<Option<CouchDbDocument>> {
        let response = self
            .request(Method::GET, self.document_url(document_id)?)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(StoreError::CouchDb(format!(
                "Failed to get session document: {}",
                response.status()
            )));
        }

        let doc = response
            .json()
            .await
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn put_document(&self, doc: &CouchDbDocument) -> StoreResult<()> {
        if !self.try_put_document(doc).await? {
            return Err(StoreError::CouchDb(format!(
                "Document update conflict: {}",
                doc.id
            )));
        }

        Ok(())
    }

    /// PUT a document. Returns `false` on a revision conflict.
    async fn try_put_document(&self, doc: &CouchDbDocument) -> StoreResult<bool> {
        let response = self
            .request(Method::PUT, self.document_url(&doc.id)?)
            .json(doc)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(false);
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StoreError::CouchDb(format!(
                "Failed to save session: {}",
                error_text
            )));
        }

        Ok(true)
    }
}

#[async_trait]
impl SessionTable for CouchDbSessionTable {
    async fn first_by_session_id(&self, session_id: &str) -> StoreResult<Option<SessionDocument>> {
        let docs = self.find(json!({ "id": session_id })).await?;
        Ok(docs.into_iter().next().map(Into::into))
    }

    async fn collect_by_shop(&self, shop: &str) -> StoreResult<Vec<SessionDocument>> {
        let docs = self.find(json!({ "shop": shop })).await?;
        Ok(docs.into_iter().map(Into::into).collect())
    }

    async fn collect_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionDocument>> {
        let selector = json!({ "expires": { "$lt": to_iso_millis(&cutoff) } });
        let docs = self.find(selector).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.record.is_expired_at(cutoff))
            .map(Into::into)
            .collect())
    }

    async fn insert(&self, record: SessionRecord) -> StoreResult<DocumentId> {
        let document_id = self.config.document_key(DocumentId::generate().as_str());
        let doc = CouchDbDocument {
            id: document_id.clone(),
            rev: None,
            creation_time: next_creation_time(),
            record,
        };

        self.put_document(&doc).await?;
        debug!("Inserted CouchDB document {}", document_id);

        Ok(DocumentId::from(document_id))
    }

    async fn upsert_by_session_id(&self, record: SessionRecord) -> StoreResult<DocumentId> {
        let key = self.config.document_key(&record.id);

        for _ in 0..UPSERT_ATTEMPTS {
            let existing = match self.get_document(&key).await? {
                Some(doc) => Some(doc),
                // Inserted documents carry random keys
                None => self
                    .find(json!({ "id": record.id }))
                    .await?
                    .into_iter()
                    .next(),
            };

            let doc = match existing {
                Some(mut doc) => {
                    doc.record.apply(RecordPatch::from(record.clone()));
                    doc
                }
                None => CouchDbDocument {
                    id: key.clone(),
                    rev: None,
                    creation_time: next_creation_time(),
                    record: record.clone(),
                },
            };

            if self.try_put_document(&doc).await? {
                debug!("Stored CouchDB document {}", doc.id);
                return Ok(DocumentId::from(doc.id));
            }
            debug!("Conflict storing session {}, re-reading", record.id);
        }

        Err(StoreError::CouchDb(format!(
            "Document update conflict: {}",
            key
        )))
    }

    async fn patch(&self, document_id: &DocumentId, patch: RecordPatch) -> StoreResult<bool> {
        let Some(mut doc) = self.get_document(document_id.as_str()).await? else {
            return Ok(false);
        };

        doc.record.apply(patch);
        self.put_document(&doc).await?;

        Ok(true)
    }

    async fn delete(&self, document_id: &DocumentId) -> StoreResult<bool> {
        let Some(doc) = self.get_document(document_id.as_str()).await? else {
            return Ok(false);
        };
        let Some(rev) = doc.rev else {
            return Ok(false);
        };

        let response = self
            .request(Method::DELETE, self.document_url(document_id.as_str())?)
            .query(&[("rev", rev.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        if !response.status().is_success() {
            return Err(StoreError::CouchDb(format!(
                "Failed to delete session: {}",
                response.status()
            )));
        }

        Ok(true)
    }

    async fn count(&self) -> StoreResult<usize> {
        #[derive(Deserialize)]
        struct AllDocsResponse {
            rows: Vec<Value>,
        }

        let prefix = self.config.document_key("");
        let start_key = json!(prefix).to_string();
        let end_key = json!(format!("{}\u{fff0}", prefix)).to_string();

        let response = self
            .request(Method::GET, &format!("{}/_all_docs", self.base_url))
            .query(&[("startkey", start_key), ("endkey", end_key)])
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::CouchDb(format!(
                "Failed to count sessions: {}",
                response.status()
            )));
        }

        let docs: AllDocsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;

        Ok(docs.rows.len())
    }
}
