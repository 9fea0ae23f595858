//! Named session functions: the component API.
//!
//! Every operation is reachable by name with a JSON argument object, split
//! into queries (reads) and mutations (writes). Transports that forward
//! calls by name, in process or over HTTP, land here.

use crate::error::{StoreError, StoreResult};
use crate::operations::SessionOperations;
use crate::schema::{SessionRecord, parse_iso};
use crate::table::SessionTable;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shopify_sessions_log::debug;
use std::fmt;

/// Whether a function reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Query,
    Mutation,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Query => "query",
            FunctionKind::Mutation => "mutation",
        }
    }
}

/// The session functions exposed by the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionFunction {
    LoadSession,
    StoreSession,
    DeleteSession,
    DeleteSessions,
    FindSessionsByShop,
    GetOfflineSessionByShop,
    DeleteSessionsByShop,
    CleanupExpiredSessions,
    UpdateScopes,
}

impl SessionFunction {
    /// Module the functions are registered under.
    pub const MODULE: &'static str = "lib";

    pub const ALL: [SessionFunction; 9] = [
        SessionFunction::LoadSession,
        SessionFunction::StoreSession,
        SessionFunction::DeleteSession,
        SessionFunction::DeleteSessions,
        SessionFunction::FindSessionsByShop,
        SessionFunction::GetOfflineSessionByShop,
        SessionFunction::DeleteSessionsByShop,
        SessionFunction::CleanupExpiredSessions,
        SessionFunction::UpdateScopes,
    ];

    /// Function name without module.
    pub fn name(&self) -> &'static str {
        match self {
            SessionFunction::LoadSession => "loadSession",
            SessionFunction::StoreSession => "storeSession",
            SessionFunction::DeleteSession => "deleteSession",
            SessionFunction::DeleteSessions => "deleteSessions",
            SessionFunction::FindSessionsByShop => "findSessionsByShop",
            SessionFunction::GetOfflineSessionByShop => "getOfflineSessionByShop",
            SessionFunction::DeleteSessionsByShop => "deleteSessionsByShop",
            SessionFunction::CleanupExpiredSessions => "cleanupExpiredSessions",
            SessionFunction::UpdateScopes => "updateScopes",
        }
    }

    /// Full path, e.g. `lib:loadSession`.
    pub fn path(&self) -> String {
        format!("{}:{}", Self::MODULE, self.name())
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            SessionFunction::LoadSession
            | SessionFunction::FindSessionsByShop
            | SessionFunction::GetOfflineSessionByShop => FunctionKind::Query,
            _ => FunctionKind::Mutation,
        }
    }

    /// Resolve `module:name` or a bare `name`.
    ///
    /// The module part is not checked, so wrappers re-exported from another
    /// module (`sessions:storeSession`) resolve to the same function.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit(':').next().unwrap_or(path);
        Self::ALL.into_iter().find(|function| function.name() == name)
    }
}

impl fmt::Display for SessionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::MODULE, self.name())
    }
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Deserialize)]
struct IdsArgs {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct ShopArgs {
    shop: String,
}

#[derive(Deserialize)]
struct ScopeArgs {
    id: String,
    scope: String,
}

#[derive(Deserialize)]
struct CleanupArgs {
    #[serde(default)]
    now: Option<String>,
}

/// Dispatches named session functions onto [`SessionOperations`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use shopify_sessions_store::{MemorySessionTable, SessionFunctions, SessionOperations};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), shopify_sessions_store::StoreError> {
/// let functions = SessionFunctions::new(SessionOperations::new(MemorySessionTable::new()));
///
/// functions
///     .mutation("lib:storeSession", json!({
///         "id": "offline_example.myshopify.com",
///         "shop": "example.myshopify.com",
///         "isOnline": false,
///     }))
///     .await?;
///
/// let loaded = functions
///     .query("lib:loadSession", json!({ "id": "offline_example.myshopify.com" }))
///     .await?;
/// assert_eq!(loaded["shop"], "example.myshopify.com");
/// # Ok(())
/// # }
/// ```
pub struct SessionFunctions<T: ?Sized> {
    operations: SessionOperations<T>,
}

impl<T: ?Sized> Clone for SessionFunctions<T> {
    fn clone(&self) -> Self {
        Self {
            operations: self.operations.clone(),
        }
    }
}

impl<T: SessionTable + ?Sized> SessionFunctions<T> {
    pub fn new(operations: SessionOperations<T>) -> Self {
        Self { operations }
    }

    /// The operations functions dispatch to.
    pub fn operations(&self) -> &SessionOperations<T> {
        &self.operations
    }

    /// Run a query function.
    pub async fn query(&self, path: &str, args: Value) -> StoreResult<Value> {
        self.invoke(path, FunctionKind::Query, args).await
    }

    /// Run a mutation function.
    pub async fn mutation(&self, path: &str, args: Value) -> StoreResult<Value> {
        self.invoke(path, FunctionKind::Mutation, args).await
    }

    async fn invoke(&self, path: &str, expected: FunctionKind, args: Value) -> StoreResult<Value> {
        let function = SessionFunction::from_path(path)
            .ok_or_else(|| StoreError::UnknownFunction(path.to_string()))?;

        if function.kind() != expected {
            return Err(StoreError::WrongFunctionKind {
                name: path.to_string(),
                expected: expected.as_str(),
                actual: function.kind().as_str(),
            });
        }

        debug!("Running {} {}", expected.as_str(), function);
        self.run(function, args).await
    }

    async fn run(&self, function: SessionFunction, args: Value) -> StoreResult<Value> {
        let ops = &self.operations;

        match function {
            SessionFunction::LoadSession => {
                let IdArgs { id } = parse_args(function, args)?;
                to_json(&ops.load(&id).await?)
            }
            SessionFunction::StoreSession => {
                let record: SessionRecord = parse_args(function, args)?;
                ops.store(record).await?;
                Ok(Value::Null)
            }
            SessionFunction::DeleteSession => {
                let IdArgs { id } = parse_args(function, args)?;
                Ok(Value::Bool(ops.delete(&id).await?))
            }
            SessionFunction::DeleteSessions => {
                let IdsArgs { ids } = parse_args(function, args)?;
                Ok(Value::Bool(ops.delete_many(&ids).await?))
            }
            SessionFunction::FindSessionsByShop => {
                let ShopArgs { shop } = parse_args(function, args)?;
                to_json(&ops.find_by_shop(&shop).await?)
            }
            SessionFunction::GetOfflineSessionByShop => {
                let ShopArgs { shop } = parse_args(function, args)?;
                to_json(&ops.get_offline_by_shop(&shop).await?)
            }
            SessionFunction::DeleteSessionsByShop => {
                let ShopArgs { shop } = parse_args(function, args)?;
                ops.delete_by_shop(&shop).await?;
                Ok(Value::Null)
            }
            SessionFunction::CleanupExpiredSessions => {
                let CleanupArgs { now } = parse_args(function, args)?;
                let now = now.as_deref().map(parse_iso).transpose()?.unwrap_or_else(Utc::now);
                Ok(Value::from(ops.cleanup_expired(now).await?))
            }
            SessionFunction::UpdateScopes => {
                let ScopeArgs { id, scope } = parse_args(function, args)?;
                Ok(Value::Bool(ops.update_scope(&id, &scope).await?))
            }
        }
    }
}

fn parse_args<A: DeserializeOwned>(function: SessionFunction, args: Value) -> StoreResult<A> {
    // An omitted argument object means "no arguments".
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };

    serde_json::from_value(args).map_err(|e| StoreError::InvalidArguments {
        function: function.path(),
        message: e.to_string(),
    })
}

fn to_json<V: Serialize>(value: &V) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}
