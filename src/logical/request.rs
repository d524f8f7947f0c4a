//! Requests routed to a backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::lease::{Auth, Secret};
use super::storage::Storage;
use super::DataMap;

/// Kind of operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    #[default]
    Read,
    Create,
    Update,
    Delete,
    List,
    Help,
    AliasLookahead,
    ResolveRole,
    Revoke,
    Renew,
    Rollback,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::List,
        Operation::Help,
        Operation::AliasLookahead,
        Operation::ResolveRole,
        Operation::Revoke,
        Operation::Renew,
        Operation::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Help => "help",
            Operation::AliasLookahead => "alias-lookahead",
            Operation::ResolveRole => "resolve-role",
            Operation::Revoke => "revoke",
            Operation::Renew => "renew",
            Operation::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown operation '{}'", s))
    }
}

/// Request-wrapping instructions supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestWrapInfo {
    pub ttl: Duration,
    pub format: String,
    pub seal_wrap: bool,
}

/// Network details of the client connection.
///
/// Never crosses the process boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    pub remote_addr: String,
}

/// Storage handle attached to a request, scoped to the backend's mount.
pub type StorageView = Arc<dyn Storage>;

/// A single request routed to a backend.
///
/// `storage` and `connection` are local to the process that holds the
/// request: translation drops them and equality ignores them.
#[derive(Clone, Default)]
pub struct Request {
    pub id: String,
    pub replication_cluster: String,
    pub operation: Operation,
    /// Path relative to the backend's mount point.
    pub path: String,
    pub data: Option<DataMap>,
    pub secret: Option<Secret>,
    pub auth: Option<Auth>,
    pub headers: HashMap<String, Vec<String>>,
    pub client_token: String,
    pub client_token_accessor: String,
    pub client_token_remaining_uses: i32,
    pub display_name: String,
    pub mount_point: String,
    pub mount_type: String,
    pub mount_accessor: String,
    pub wrap_info: Option<RequestWrapInfo>,
    pub entity_id: String,
    pub policy_override: bool,
    pub unauthenticated: bool,
    pub connection: Option<Connection>,
    pub storage: Option<StorageView>,
}

impl Request {
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self { operation, path: path.into(), ..Default::default() }
    }

    pub fn with_data(mut self, data: DataMap) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_storage(mut self, storage: StorageView) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Look up a single value from the request data.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("path", &self.path)
            .field("data", &self.data)
            .field("secret", &self.secret)
            .field("auth", &self.auth)
            .field("display_name", &self.display_name)
            .field("mount_point", &self.mount_point)
            .field("entity_id", &self.entity_id)
            .field("has_storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.replication_cluster == other.replication_cluster
            && self.operation == other.operation
            && self.path == other.path
            && self.data == other.data
            && self.secret == other.secret
            && self.auth == other.auth
            && self.headers == other.headers
            && self.client_token == other.client_token
            && self.client_token_accessor == other.client_token_accessor
            && self.client_token_remaining_uses == other.client_token_remaining_uses
            && self.display_name == other.display_name
            && self.mount_point == other.mount_point
            && self.mount_type == other.mount_type
            && self.mount_accessor == other.mount_accessor
            && self.wrap_info == other.wrap_info
            && self.entity_id == other.entity_id
            && self.policy_override == other.policy_override
            && self.unauthenticated == other.unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::InmemStorage;

    #[test]
    fn test_operation_parse_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("destroy".parse::<Operation>().is_err());
    }

    #[test]
    fn test_equality_ignores_local_fields() {
        let plain = Request::new(Operation::Read, "kv/foo");
        let mut local = plain.clone().with_storage(Arc::new(InmemStorage::new()));
        local.connection = Some(Connection { remote_addr: "127.0.0.1:8200".into() });
        assert_eq!(plain, local);
    }

    #[test]
    fn test_get_data_value() {
        let mut data = DataMap::new();
        data.insert("value".into(), serde_json::json!("bar"));
        let req = Request::new(Operation::Update, "kv/foo").with_data(data);
        assert_eq!(req.get("value"), Some(&serde_json::json!("bar")));
        assert!(req.get("missing").is_none());
    }
}
