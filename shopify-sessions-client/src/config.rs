//! Client configuration.

use crate::error::{ClientError, ClientResult};
use shopify_sessions_store::SessionFunction;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What the client does when a transport call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and return the operation's safe default
    /// (`false`, `None`, empty list, `0`)
    #[default]
    Degrade,
    /// Return the failure to the caller unchanged
    Propagate,
}

impl FromStr for FailurePolicy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "degrade" => Ok(FailurePolicy::Degrade),
            "propagate" => Ok(FailurePolicy::Propagate),
            other => Err(ClientError::Config(format!(
                "Unknown failure policy '{}' (expected degrade or propagate)",
                other
            ))),
        }
    }
}

/// Names of the remote functions the client calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRefs {
    pub store_session: String,
    pub load_session: String,
    pub delete_session: String,
    pub delete_sessions: String,
    pub find_sessions_by_shop: String,
    pub get_offline_session_by_shop: String,
    pub delete_sessions_by_shop: String,
    pub cleanup_expired_sessions: String,
    pub update_scopes: String,
}

impl FunctionRefs {
    /// Refs into a module, e.g. `sessions` gives `sessions:storeSession`.
    ///
    /// Use this when the app re-exports the session functions from its own
    /// module.
    pub fn with_module(module: &str) -> Self {
        let path = |function: SessionFunction| format!("{}:{}", module, function.name());
        Self {
            store_session: path(SessionFunction::StoreSession),
            load_session: path(SessionFunction::LoadSession),
            delete_session: path(SessionFunction::DeleteSession),
            delete_sessions: path(SessionFunction::DeleteSessions),
            find_sessions_by_shop: path(SessionFunction::FindSessionsByShop),
            get_offline_session_by_shop: path(SessionFunction::GetOfflineSessionByShop),
            delete_sessions_by_shop: path(SessionFunction::DeleteSessionsByShop),
            cleanup_expired_sessions: path(SessionFunction::CleanupExpiredSessions),
            update_scopes: path(SessionFunction::UpdateScopes),
        }
    }
}

impl Default for FunctionRefs {
    fn default() -> Self {
        Self::with_module(SessionFunction::MODULE)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deployment URL the HTTP transport posts to
    pub url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Remote function names
    pub functions: FunctionRefs,
    /// Behaviour on transport failure
    pub failure_policy: FailurePolicy,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for a deployment URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use shopify_sessions_client::{ClientConfig, FailurePolicy};
    ///
    /// let config = ClientConfig::new("https://happy-otter-123.convex.cloud")
    ///     .unwrap()
    ///     .with_failure_policy(FailurePolicy::Propagate);
    /// assert_eq!(config.functions.load_session, "lib:loadSession");
    /// ```
    pub fn new(url: &str) -> ClientResult<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(
                "Deployment URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            auth_token: None,
            functions: FunctionRefs::default(),
            failure_policy: FailurePolicy::default(),
            timeout: Duration::from_secs(10),
        })
    }

    /// Read configuration from the environment.
    ///
    /// - `SHOPIFY_SESSIONS_URL` (required)
    /// - `SHOPIFY_SESSIONS_AUTH_TOKEN`
    /// - `SHOPIFY_SESSIONS_FUNCTION_MODULE` (default `lib`)
    /// - `SHOPIFY_SESSIONS_FAILURE_POLICY` - `degrade` (default) or `propagate`
    /// - `SHOPIFY_SESSIONS_TIMEOUT_SECS` (default 10)
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SHOPIFY_SESSIONS_URL")
            .ok_or_else(|| ClientError::Config("SHOPIFY_SESSIONS_URL is not set".to_string()))?;
        let mut config = Self::new(&url)?;

        if let Some(token) = lookup("SHOPIFY_SESSIONS_AUTH_TOKEN") {
            config = config.with_auth_token(token);
        }
        if let Some(module) = lookup("SHOPIFY_SESSIONS_FUNCTION_MODULE") {
            config = config.with_functions(FunctionRefs::with_module(&module));
        }
        if let Some(policy) = lookup("SHOPIFY_SESSIONS_FAILURE_POLICY") {
            config = config.with_failure_policy(policy.parse()?);
        }
        if let Some(secs) = lookup("SHOPIFY_SESSIONS_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ClientError::Config(format!("Invalid SHOPIFY_SESSIONS_TIMEOUT_SECS '{}'", secs))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_functions(mut self, functions: FunctionRefs) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
