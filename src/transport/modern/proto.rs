//! Messages and generated gRPC stubs of the modern transport.
//!
//! The modules `backend_client`, `backend_server`, `storage_client`,
//! `storage_server`, `system_view_client` and `system_view_server` are
//! generated by the build script from these message types.

use crate::translate::WireError;
use crate::transport::protocol;

pub use crate::shims::storage::{ErrReply, GetReply, KeyArgs, ListArgs, ListReply, PutArgs};
pub use crate::shims::system_view::{
    FlagReply, ReplicationStateReply, SudoArgs, TtlReply, WrapArgs, WrapReply,
};
pub use crate::transport::protocol::{
    Empty, InvalidateKeyArgs, RequestArgs, SetupArgs, SpecialPathsReply, TypeReply,
};

pub type HandleRequestReply = protocol::HandleRequestReply<WireError>;
pub type ExistenceCheckReply = protocol::ExistenceCheckReply<WireError>;
pub type ErrorReply = protocol::ErrorReply<WireError>;

include!(concat!(env!("OUT_DIR"), "/backend_plugin.v5.Backend.rs"));
include!(concat!(env!("OUT_DIR"), "/backend_plugin.v5.Storage.rs"));
include!(concat!(env!("OUT_DIR"), "/backend_plugin.v5.SystemView.rs"));
