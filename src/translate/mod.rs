//! # Translation Layer
//!
//! Pure conversions between [`crate::logical`] types and the serde structs
//! that cross the process boundary, plus the error encodings used by each
//! transport.

pub mod convert;
pub mod errors;
pub mod wire;

pub use convert::{
    auth_from_wire, auth_to_wire, decode_map, encode_map, request_from_wire, request_to_wire,
    response_from_wire, response_to_wire, response_wrap_info_from_wire,
    response_wrap_info_to_wire, secret_from_wire, secret_to_wire, storage_entry_from_wire,
    storage_entry_to_wire,
};
pub use errors::{
    error_from_flat, error_from_wire, error_to_flat, error_to_wire, ErrorType, FlatError,
    FlatErrorKind, WireError,
};
pub use wire::{
    WireAlias, WireAuth, WireLeaseOptions, WireRequest, WireRequestWrapInfo, WireResponse,
    WireResponseWrapInfo, WireSecret, WireStorageEntry,
};
