//! Session record schema.
//!
//! [`SessionRecord`] is the one canonical shape of a session. On the wire it
//! uses the camelCase keys Shopify's session storage adapters expect, with
//! `expires` as a millisecond-precision ISO-8601 string. In memory `expires`
//! is a normalized UTC instant.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Profile of the user an online session was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedUser {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub account_owner: bool,
    pub locale: String,
    pub collaborator: bool,
    pub email_verified: bool,
}

/// Token lifetime and user profile carried by online sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineAccessInfo {
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub associated_user_scope: String,
    pub associated_user: AssociatedUser,
}

/// A persisted Shopify app session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Unique session id (e.g. `offline_example.myshopify.com`)
    pub id: String,
    /// Shop domain
    pub shop: String,
    /// OAuth handshake state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Online (per-user) or offline (per-shop) session
    pub is_online: bool,
    /// Comma-joined granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_millis")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_access_info: Option<OnlineAccessInfo>,
}

impl SessionRecord {
    /// Create a record with only the required fields.
    pub fn new(id: impl Into<String>, shop: impl Into<String>, is_online: bool) -> Self {
        Self {
            id: id.into(),
            shop: shop.into(),
            state: None,
            is_online,
            scope: None,
            expires: None,
            access_token: None,
            online_access_info: None,
        }
    }

    /// Create the conventional offline session record for a shop.
    pub fn offline(shop: impl Into<String>) -> Self {
        let shop = shop.into();
        Self::new(offline_session_id(&shop), shop, false)
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_online_access_info(mut self, info: OnlineAccessInfo) -> Self {
        self.online_access_info = Some(info);
        self
    }

    /// Whether `expires` is present and strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    /// Check the fields a store call relies on.
    pub fn validate(&self) -> StoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(StoreError::Validation("id must not be empty".to_string()));
        }
        if self.shop.trim().is_empty() {
            return Err(StoreError::Validation(format!(
                "shop must not be empty (session {})",
                self.id
            )));
        }
        Ok(())
    }

    /// Merge a patch into this record. Unset patch fields leave the stored
    /// value untouched.
    pub fn apply(&mut self, patch: RecordPatch) {
        let RecordPatch {
            shop,
            state,
            is_online,
            scope,
            expires,
            access_token,
            online_access_info,
        } = patch;

        if let Some(shop) = shop {
            self.shop = shop;
        }
        if let Some(is_online) = is_online {
            self.is_online = is_online;
        }
        if state.is_some() {
            self.state = state;
        }
        if scope.is_some() {
            self.scope = scope;
        }
        if expires.is_some() {
            self.expires = expires;
        }
        if access_token.is_some() {
            self.access_token = access_token;
        }
        if online_access_info.is_some() {
            self.online_access_info = online_access_info;
        }
    }
}

/// Field-level update for an existing record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub shop: Option<String>,
    pub state: Option<String>,
    pub is_online: Option<bool>,
    pub scope: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub access_token: Option<String>,
    pub online_access_info: Option<OnlineAccessInfo>,
}

impl RecordPatch {
    /// Patch touching only `scope`.
    pub fn scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Default::default()
        }
    }

    /// Whether this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<SessionRecord> for RecordPatch {
    fn from(record: SessionRecord) -> Self {
        Self {
            shop: Some(record.shop),
            state: record.state,
            is_online: Some(record.is_online),
            scope: record.scope,
            expires: record.expires,
            access_token: record.access_token,
            online_access_info: record.online_access_info,
        }
    }
}

/// Backend-assigned document id, distinct from the session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random document id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored record together with its document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(rename = "_id")]
    pub document_id: DocumentId,
    /// Insertion time, epoch milliseconds with a microsecond fraction
    #[serde(rename = "_creationTime")]
    pub creation_time: f64,
    #[serde(flatten)]
    pub record: SessionRecord,
}

impl SessionDocument {
    /// Wrap a record inserted now under a fresh document id.
    pub fn create(record: SessionRecord) -> Self {
        Self {
            document_id: DocumentId::generate(),
            creation_time: next_creation_time(),
            record,
        }
    }
}

static LAST_CREATION_MICROS: AtomicI64 = AtomicI64::new(0);

/// Creation timestamp in epoch milliseconds, strictly increasing within
/// the process.
///
/// The fraction carries microseconds, and two calls in the same microsecond
/// are pushed one microsecond apart.
pub fn next_creation_time() -> f64 {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_CREATION_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1) as f64 / 1000.0
}

/// Id of the offline session for a shop.
pub fn offline_session_id(shop: &str) -> String {
    format!("offline_{}", shop)
}

/// Id of a user's online session for a shop.
pub fn online_session_id(shop: &str, user_id: u64) -> String {
    format!("{}_{}", shop, user_id)
}

/// Format an instant the way `expires` is stored: `2025-06-01T00:00:00.000Z`.
///
/// The output is fixed-width, so stored values also sort lexicographically
/// in time order.
pub fn to_iso_millis(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 / RFC 3339 timestamp into UTC.
pub fn parse_iso(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| StoreError::Validation(format!("invalid timestamp '{}': {}", value, e)))
}

mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(instant) => serializer.serialize_str(&super::to_iso_millis(instant)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|value| super::parse_iso(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}
