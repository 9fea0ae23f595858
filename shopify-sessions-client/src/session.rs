//! The session value handed around by application and OAuth code.

use chrono::{DateTime, Duration, Utc};
use shopify_sessions_store::{AssociatedUser, offline_session_id, online_session_id};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Window used by [`Session::is_active`] when checking expiry.
pub const ACTIVE_EXPIRY_WINDOW: Duration = Duration::milliseconds(500);

/// Online access details as the OAuth flow returns them.
///
/// The user profile may be missing on partially populated sessions; such
/// sessions are stored without any access info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAccessInfo {
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub associated_user_scope: String,
    pub associated_user: Option<AssociatedUser>,
}

/// Shopify app session.
///
/// Contains the shop identity, the OAuth credential and the scopes it was
/// granted.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Shop domain
    pub shop: String,
    /// OAuth handshake state (empty once the handshake is done)
    pub state: String,
    /// Online (per-user) or offline (per-shop) session
    pub is_online: bool,
    /// Comma-joined granted scopes
    pub scope: Option<String>,
    /// Session expiration timestamp
    pub expires: Option<DateTime<Utc>>,
    /// Access token
    pub access_token: Option<String>,
    /// Online access details
    pub online_access_info: Option<SessionAccessInfo>,
}

impl Session {
    /// Create a session with the given id and shop.
    pub fn new(id: impl Into<String>, shop: impl Into<String>, is_online: bool) -> Self {
        Self {
            id: id.into(),
            shop: shop.into(),
            state: String::new(),
            is_online,
            scope: None,
            expires: None,
            access_token: None,
            online_access_info: None,
        }
    }

    /// Create the offline session for a shop.
    pub fn offline(shop: impl Into<String>) -> Self {
        let shop = shop.into();
        Self::new(offline_session_id(&shop), shop, false)
    }

    /// Create a user's online session for a shop.
    pub fn online(shop: impl Into<String>, user_id: u64) -> Self {
        let shop = shop.into();
        Self::new(online_session_id(&shop, user_id), shop, true)
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
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

    pub fn with_online_access_info(mut self, info: SessionAccessInfo) -> Self {
        self.online_access_info = Some(info);
        self
    }

    /// Check if the session expires within `within` from now.
    pub fn is_expired(&self, within: Duration) -> bool {
        self.is_expired_at(Utc::now(), within)
    }

    /// Check if the session expires within `within` of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, within: Duration) -> bool {
        self.expires.is_some_and(|expires| expires - within < now)
    }

    /// Whether the session can be used for requests needing `scopes`.
    ///
    /// A session is active when it has an access token, does not expire in
    /// the next [`ACTIVE_EXPIRY_WINDOW`] and was granted exactly `scopes`.
    pub fn is_active(&self, scopes: &AuthScopes) -> bool {
        self.is_active_at(Utc::now(), scopes)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>, scopes: &AuthScopes) -> bool {
        self.access_token.is_some()
            && !self.is_expired_at(now, ACTIVE_EXPIRY_WINDOW)
            && !self.is_scope_changed(scopes)
    }

    /// Whether the granted scopes differ from `scopes`.
    pub fn is_scope_changed(&self, scopes: &AuthScopes) -> bool {
        let granted = AuthScopes::new(self.scope.as_deref().unwrap_or_default());
        !granted.equals(scopes)
    }
}

/// A set of OAuth scopes.
///
/// Scopes compare by membership. A `write_x` grant implies `read_x`, so
/// `write_products` equals `read_products,write_products`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthScopes {
    expanded: BTreeSet<String>,
}

impl AuthScopes {
    /// Parse a comma-separated scope list. Blank entries are ignored.
    pub fn new(scopes: &str) -> Self {
        Self::from_iter(scopes.split(','))
    }

    /// Whether every scope in `other` is granted here.
    pub fn has(&self, other: &AuthScopes) -> bool {
        other.expanded.is_subset(&self.expanded)
    }

    /// Whether both sets grant the same access.
    pub fn equals(&self, other: &AuthScopes) -> bool {
        self.expanded == other.expanded
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    /// Scopes with implied reads removed.
    pub fn compressed(&self) -> Vec<&str> {
        self.expanded
            .iter()
            .filter(|scope| {
                implied_by_write(scope).is_none_or(|write| !self.expanded.contains(&write))
            })
            .map(String::as_str)
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AuthScopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut expanded = BTreeSet::new();
        for scope in iter {
            let scope = scope.as_ref().trim();
            if scope.is_empty() {
                continue;
            }
            if let Some(read) = implied_read(scope) {
                expanded.insert(read);
            }
            expanded.insert(scope.to_string());
        }
        Self { expanded }
    }
}

impl FromStr for AuthScopes {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for AuthScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compressed().join(","))
    }
}

// write_x / unauthenticated_write_x -> the matching read scope
fn implied_read(scope: &str) -> Option<String> {
    if let Some(resource) = scope.strip_prefix("unauthenticated_write_") {
        return Some(format!("unauthenticated_read_{}", resource));
    }
    scope
        .strip_prefix("write_")
        .map(|resource| format!("read_{}", resource))
}

fn implied_by_write(scope: &str) -> Option<String> {
    if let Some(resource) = scope.strip_prefix("unauthenticated_read_") {
        return Some(format!("unauthenticated_write_{}", resource));
    }
    scope
        .strip_prefix("read_")
        .map(|resource| format!("write_{}", resource))
}
