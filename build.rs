//! Generates the modern transport's gRPC services.
//!
//! Messages are the serde types re-exported from `transport::modern::proto`
//! and travel through a JSON codec, so there are no `.proto` files.

use tonic_build::manual::{Builder, Method, Service};

const PACKAGE: &str = "backend_plugin.v5";
const CODEC: &str = "crate::transport::modern::codec::JsonCodec";
const TYPES: &str = "crate::transport::modern::proto";

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("{}::{}", TYPES, input))
        .output_type(format!("{}::{}", TYPES, output))
        .codec_path(CODEC)
        .build()
}

fn main() {
    let backend = Service::builder()
        .name("Backend")
        .package(PACKAGE)
        .method(unary("setup", "Setup", "SetupArgs", "ErrorReply"))
        .method(unary("handle_request", "HandleRequest", "RequestArgs", "HandleRequestReply"))
        .method(unary(
            "handle_existence_check",
            "HandleExistenceCheck",
            "RequestArgs",
            "ExistenceCheckReply",
        ))
        .method(unary("special_paths", "SpecialPaths", "Empty", "SpecialPathsReply"))
        .method(unary("backend_type", "Type", "Empty", "TypeReply"))
        .method(unary("initialize", "Initialize", "Empty", "ErrorReply"))
        .method(unary("invalidate_key", "InvalidateKey", "InvalidateKeyArgs", "Empty"))
        .method(unary("cleanup", "Cleanup", "Empty", "ErrorReply"))
        .build();

    let storage = Service::builder()
        .name("Storage")
        .package(PACKAGE)
        .method(unary("list", "List", "ListArgs", "ListReply"))
        .method(unary("get", "Get", "KeyArgs", "GetReply"))
        .method(unary("put", "Put", "PutArgs", "ErrReply"))
        .method(unary("delete", "Delete", "KeyArgs", "ErrReply"))
        .build();

    let system_view = Service::builder()
        .name("SystemView")
        .package(PACKAGE)
        .method(unary("default_lease_ttl", "DefaultLeaseTTL", "Empty", "TtlReply"))
        .method(unary("max_lease_ttl", "MaxLeaseTTL", "Empty", "TtlReply"))
        .method(unary("sudo_privilege", "SudoPrivilege", "SudoArgs", "FlagReply"))
        .method(unary("tainted", "Tainted", "Empty", "FlagReply"))
        .method(unary("caching_disabled", "CachingDisabled", "Empty", "FlagReply"))
        .method(unary("replication_state", "ReplicationState", "Empty", "ReplicationStateReply"))
        .method(unary("response_wrap_data", "ResponseWrapData", "WrapArgs", "WrapReply"))
        .method(unary("mlock_enabled", "MlockEnabled", "Empty", "FlagReply"))
        .method(unary("local_mount", "LocalMount", "Empty", "FlagReply"))
        .build();

    Builder::new().compile(&[backend, storage, system_view]);
    println!("cargo:rerun-if-changed=build.rs");
}
