//! # Logical Domain Model
//!
//! Types exchanged between the host and a backend: requests, responses,
//! leases, storage, the system view, the logger and the [`Backend`] contract
//! itself. Nothing in this module knows about processes or wire formats.

pub mod backend;
pub mod context;
pub mod error;
pub mod lease;
pub mod logger;
pub mod request;
pub mod response;
pub mod storage;
pub mod system_view;

/// Opaque structured data carried by requests, responses and leases.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

pub use backend::{Backend, BackendConfig, BackendFactory, BackendType, ExistenceCheck, Paths};
pub use context::Context;
pub use error::{LogicalError, Result, LOOKUP_PLUGIN_UNSUPPORTED, SENTINELS};
pub use lease::{Alias, Auth, LeaseOptions, Secret};
pub use logger::{LogLevel, Logger, TracingLogger};
pub use request::{Connection, Operation, Request, RequestWrapInfo, StorageView};
pub use response::{Response, ResponseWrapInfo};
pub use storage::{InmemStorage, NoopStorage, Storage, StorageEntry};
pub use system_view::{PluginRunner, ReplicationState, StaticSystemView, SystemView};
