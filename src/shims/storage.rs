//! Storage proxy and its serving side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::logical::{self, Context, LogicalError, Storage, StorageEntry};
use crate::rpc::{answer, RpcClient, RpcStatus, Service};
use crate::translate::{storage_entry_from_wire, storage_entry_to_wire, WireStorageEntry};

pub const METHOD_LIST: &str = "Storage.List";
pub const METHOD_GET: &str = "Storage.Get";
pub const METHOD_PUT: &str = "Storage.Put";
pub const METHOD_DELETE: &str = "Storage.Delete";

#[derive(Debug, Serialize, Deserialize)]
pub struct ListArgs {
    pub prefix: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListReply {
    pub keys: Vec<String>,
    #[serde(default)]
    pub err: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyArgs {
    pub key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GetReply {
    #[serde(default)]
    pub entry: Option<WireStorageEntry>,
    #[serde(default)]
    pub err: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutArgs {
    pub entry: WireStorageEntry,
}

/// Reply carrying only an error message; empty means success.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrReply {
    #[serde(default)]
    pub err: String,
}

fn err_text(result: &logical::Result<()>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(e) => e.to_string(),
    }
}

/// Rebuild the error an `err` reply field carries.
pub(crate) fn check(err: String) -> logical::Result<()> {
    if err.is_empty() {
        Ok(())
    } else {
        Err(LogicalError::from_message(err))
    }
}

/// [`Storage`] implemented by calls to the peer process.
#[derive(Clone)]
pub struct StorageClient {
    rpc: RpcClient,
}

impl StorageClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn close(&self) {
        self.rpc.close();
    }
}

#[async_trait]
impl Storage for StorageClient {
    async fn list(&self, prefix: &str) -> logical::Result<Vec<String>> {
        let args = ListArgs { prefix: prefix.to_string() };
        let reply: ListReply = self.rpc.call(METHOD_LIST, &args).await?;
        check(reply.err)?;
        Ok(reply.keys)
    }

    async fn get(&self, key: &str) -> logical::Result<Option<StorageEntry>> {
        let args = KeyArgs { key: key.to_string() };
        let reply: GetReply = self.rpc.call(METHOD_GET, &args).await?;
        check(reply.err)?;
        Ok(reply.entry.map(storage_entry_from_wire))
    }

    async fn put(&self, entry: &StorageEntry) -> logical::Result<()> {
        let args = PutArgs { entry: storage_entry_to_wire(entry) };
        let reply: ErrReply = self.rpc.call(METHOD_PUT, &args).await?;
        check(reply.err)
    }

    async fn delete(&self, key: &str) -> logical::Result<()> {
        let args = KeyArgs { key: key.to_string() };
        let reply: ErrReply = self.rpc.call(METHOD_DELETE, &args).await?;
        check(reply.err)
    }
}

/// Serves a local [`Storage`] to the peer process.
pub struct StorageServer {
    storage: Arc<dyn Storage>,
}

impl StorageServer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Handle a `Storage.*` method; `None` when the method is not ours.
    pub async fn dispatch(&self, method: &str, body: Value) -> Option<Result<Value, RpcStatus>> {
        let result = match method {
            METHOD_LIST => answer(body, |args| self.list(args)).await,
            METHOD_GET => answer(body, |args| self.get(args)).await,
            METHOD_PUT => answer(body, |args| self.put(args)).await,
            METHOD_DELETE => answer(body, |args| self.delete(args)).await,
            _ => return None,
        };
        Some(result)
    }

    pub async fn list(&self, args: ListArgs) -> ListReply {
        match self.storage.list(&args.prefix).await {
            Ok(keys) => ListReply { keys, err: String::new() },
            Err(e) => ListReply { keys: Vec::new(), err: e.to_string() },
        }
    }

    pub async fn get(&self, args: KeyArgs) -> GetReply {
        match self.storage.get(&args.key).await {
            Ok(entry) => GetReply { entry: entry.as_ref().map(storage_entry_to_wire), err: String::new() },
            Err(e) => GetReply { entry: None, err: e.to_string() },
        }
    }

    pub async fn put(&self, args: PutArgs) -> ErrReply {
        let entry = storage_entry_from_wire(args.entry);
        ErrReply { err: err_text(&self.storage.put(&entry).await) }
    }

    pub async fn delete(&self, args: KeyArgs) -> ErrReply {
        ErrReply { err: err_text(&self.storage.delete(&args.key).await) }
    }
}

#[async_trait]
impl Service for StorageServer {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn call(&self, _ctx: Context, method: &str, body: Value) -> Result<Value, RpcStatus> {
        self.dispatch(method, body).await.unwrap_or_else(|| Err(RpcStatus::unknown_method(method)))
    }
}
