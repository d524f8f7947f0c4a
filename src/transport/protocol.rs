//! Backend service methods and message shapes shared by both transports.
//!
//! The two transports differ in how errors are encoded (`E`) and in how
//! storage is reached, so argument types that name broker IDs are separate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::logical::{BackendType, Paths};
use crate::translate::{WireRequest, WireResponse};

pub const METHOD_HANDLE_REQUEST: &str = "Backend.HandleRequest";
pub const METHOD_HANDLE_EXISTENCE_CHECK: &str = "Backend.HandleExistenceCheck";
pub const METHOD_SPECIAL_PATHS: &str = "Backend.SpecialPaths";
pub const METHOD_TYPE: &str = "Backend.Type";
pub const METHOD_SETUP: &str = "Backend.Setup";
pub const METHOD_INITIALIZE: &str = "Backend.Initialize";
pub const METHOD_INVALIDATE_KEY: &str = "Backend.InvalidateKey";
pub const METHOD_CLEANUP: &str = "Backend.Cleanup";

/// Arguments or reply of a method that carries nothing.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Legacy request arguments: the request plus the per-call storage stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct LegacyRequestArgs {
    pub storage_id: u32,
    pub request: WireRequest,
}

/// Modern request arguments; storage is the long-lived setup stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestArgs {
    pub request: WireRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HandleRequestReply<E> {
    #[serde(default)]
    pub response: Option<WireResponse>,
    pub err: Option<E>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExistenceCheckReply<E> {
    pub found: bool,
    pub exists: bool,
    pub err: Option<E>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpecialPathsReply {
    #[serde(default)]
    pub paths: Option<Paths>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TypeReply {
    pub backend_type: BackendType,
}

/// Legacy setup: one broker stream per shim.
#[derive(Debug, Serialize, Deserialize)]
pub struct LegacySetupArgs {
    pub storage_id: u32,
    pub logger_id: u32,
    pub sys_view_id: u32,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Modern setup: one stream serving Storage and SystemView together.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupArgs {
    pub broker_id: u32,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Reply carrying only an optional error.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply<E> {
    pub err: Option<E>,
}

impl<E> Default for ErrorReply<E> {
    fn default() -> Self {
        Self { err: None }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateKeyArgs {
    pub key: String,
}
