//! Conversions between domain types and their wire form.
//!
//! `*_to_wire` followed by `*_from_wire` is the identity on every field that
//! crosses the process boundary. `Request::storage` and
//! `Request::connection` are dropped.

use crate::errors::{Error, Result};
use crate::logical::{
    Alias, Auth, DataMap, LeaseOptions, Request, RequestWrapInfo, Response, ResponseWrapInfo,
    Secret, StorageEntry,
};

use super::wire::{
    WireAlias, WireAuth, WireLeaseOptions, WireRequest, WireRequestWrapInfo, WireResponse,
    WireResponseWrapInfo, WireSecret, WireStorageEntry,
};

/// Encode an optional opaque map; `None` becomes the empty string.
pub fn encode_map(map: Option<&DataMap>) -> Result<String> {
    match map {
        None => Ok(String::new()),
        Some(map) => {
            serde_json::to_string(map).map_err(|e| Error::codec(e, "failed to encode data map"))
        }
    }
}

/// Decode an opaque map; the empty string becomes `None`.
pub fn decode_map(raw: &str) -> Result<Option<DataMap>> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some).map_err(|e| Error::codec(e, "failed to decode data map"))
}

fn lease_to_wire(lease: &LeaseOptions) -> WireLeaseOptions {
    WireLeaseOptions {
        ttl: lease.ttl,
        max_ttl: lease.max_ttl,
        renewable: lease.renewable,
        increment: lease.increment,
        issue_time: lease.issue_time,
    }
}

fn lease_from_wire(lease: WireLeaseOptions) -> LeaseOptions {
    LeaseOptions {
        ttl: lease.ttl,
        max_ttl: lease.max_ttl,
        renewable: lease.renewable,
        increment: lease.increment,
        issue_time: lease.issue_time,
    }
}

pub fn secret_to_wire(secret: &Secret) -> Result<WireSecret> {
    Ok(WireSecret {
        lease_options: lease_to_wire(&secret.lease),
        internal_data: encode_map(secret.internal_data.as_ref())?,
        lease_id: secret.lease_id.clone(),
    })
}

pub fn secret_from_wire(secret: WireSecret) -> Result<Secret> {
    Ok(Secret {
        lease: lease_from_wire(secret.lease_options),
        internal_data: decode_map(&secret.internal_data)?,
        lease_id: secret.lease_id,
    })
}

fn alias_to_wire(alias: &Alias) -> WireAlias {
    WireAlias {
        mount_type: alias.mount_type.clone(),
        mount_accessor: alias.mount_accessor.clone(),
        name: alias.name.clone(),
    }
}

fn alias_from_wire(alias: WireAlias) -> Alias {
    Alias { mount_type: alias.mount_type, mount_accessor: alias.mount_accessor, name: alias.name }
}

pub fn auth_to_wire(auth: &Auth) -> Result<WireAuth> {
    Ok(WireAuth {
        lease_options: lease_to_wire(&auth.lease),
        internal_data: encode_map(auth.internal_data.as_ref())?,
        display_name: auth.display_name.clone(),
        policies: auth.policies.clone(),
        metadata: auth.metadata.clone(),
        client_token: auth.client_token.clone(),
        accessor: auth.accessor.clone(),
        period: auth.period,
        explicit_max_ttl: auth.explicit_max_ttl,
        num_uses: auth.num_uses,
        entity_id: auth.entity_id.clone(),
        alias: auth.alias.as_ref().map(alias_to_wire),
        group_aliases: auth.group_aliases.iter().map(alias_to_wire).collect(),
    })
}

pub fn auth_from_wire(auth: WireAuth) -> Result<Auth> {
    Ok(Auth {
        lease: lease_from_wire(auth.lease_options),
        internal_data: decode_map(&auth.internal_data)?,
        display_name: auth.display_name,
        policies: auth.policies,
        metadata: auth.metadata,
        client_token: auth.client_token,
        accessor: auth.accessor,
        period: auth.period,
        explicit_max_ttl: auth.explicit_max_ttl,
        num_uses: auth.num_uses,
        entity_id: auth.entity_id,
        alias: auth.alias.map(alias_from_wire),
        group_aliases: auth.group_aliases.into_iter().map(alias_from_wire).collect(),
    })
}

pub fn request_to_wire(req: &Request) -> Result<WireRequest> {
    Ok(WireRequest {
        id: req.id.clone(),
        replication_cluster: req.replication_cluster.clone(),
        operation: req.operation,
        path: req.path.clone(),
        data: encode_map(req.data.as_ref())?,
        secret: req.secret.as_ref().map(secret_to_wire).transpose()?,
        auth: req.auth.as_ref().map(auth_to_wire).transpose()?,
        headers: req.headers.clone(),
        client_token: req.client_token.clone(),
        client_token_accessor: req.client_token_accessor.clone(),
        client_token_remaining_uses: req.client_token_remaining_uses,
        display_name: req.display_name.clone(),
        mount_point: req.mount_point.clone(),
        mount_type: req.mount_type.clone(),
        mount_accessor: req.mount_accessor.clone(),
        wrap_info: req.wrap_info.as_ref().map(|w| WireRequestWrapInfo {
            ttl: w.ttl,
            format: w.format.clone(),
            seal_wrap: w.seal_wrap,
        }),
        entity_id: req.entity_id.clone(),
        policy_override: req.policy_override,
        unauthenticated: req.unauthenticated,
    })
}

/// Rebuild a request. The result has no storage view and no connection.
pub fn request_from_wire(req: WireRequest) -> Result<Request> {
    Ok(Request {
        id: req.id,
        replication_cluster: req.replication_cluster,
        operation: req.operation,
        path: req.path,
        data: decode_map(&req.data)?,
        secret: req.secret.map(secret_from_wire).transpose()?,
        auth: req.auth.map(auth_from_wire).transpose()?,
        headers: req.headers,
        client_token: req.client_token,
        client_token_accessor: req.client_token_accessor,
        client_token_remaining_uses: req.client_token_remaining_uses,
        display_name: req.display_name,
        mount_point: req.mount_point,
        mount_type: req.mount_type,
        mount_accessor: req.mount_accessor,
        wrap_info: req.wrap_info.map(|w| RequestWrapInfo {
            ttl: w.ttl,
            format: w.format,
            seal_wrap: w.seal_wrap,
        }),
        entity_id: req.entity_id,
        policy_override: req.policy_override,
        unauthenticated: req.unauthenticated,
        connection: None,
        storage: None,
    })
}

pub fn response_wrap_info_to_wire(info: &ResponseWrapInfo) -> WireResponseWrapInfo {
    WireResponseWrapInfo {
        ttl: info.ttl,
        token: info.token.clone(),
        accessor: info.accessor.clone(),
        creation_time: info.creation_time,
        wrapped_accessor: info.wrapped_accessor.clone(),
        wrapped_entity_id: info.wrapped_entity_id.clone(),
        format: info.format.clone(),
        creation_path: info.creation_path.clone(),
        seal_wrap: info.seal_wrap,
    }
}

pub fn response_wrap_info_from_wire(info: WireResponseWrapInfo) -> ResponseWrapInfo {
    ResponseWrapInfo {
        ttl: info.ttl,
        token: info.token,
        accessor: info.accessor,
        creation_time: info.creation_time,
        wrapped_accessor: info.wrapped_accessor,
        wrapped_entity_id: info.wrapped_entity_id,
        format: info.format,
        creation_path: info.creation_path,
        seal_wrap: info.seal_wrap,
    }
}

pub fn response_to_wire(resp: &Response) -> Result<WireResponse> {
    Ok(WireResponse {
        data: encode_map(resp.data.as_ref())?,
        secret: resp.secret.as_ref().map(secret_to_wire).transpose()?,
        auth: resp.auth.as_ref().map(auth_to_wire).transpose()?,
        redirect: resp.redirect.clone(),
        warnings: resp.warnings.clone(),
        wrap_info: resp.wrap_info.as_ref().map(response_wrap_info_to_wire),
    })
}

pub fn response_from_wire(resp: WireResponse) -> Result<Response> {
    Ok(Response {
        data: decode_map(&resp.data)?,
        secret: resp.secret.map(secret_from_wire).transpose()?,
        auth: resp.auth.map(auth_from_wire).transpose()?,
        redirect: resp.redirect,
        warnings: resp.warnings,
        wrap_info: resp.wrap_info.map(response_wrap_info_from_wire),
    })
}

pub fn storage_entry_to_wire(entry: &StorageEntry) -> WireStorageEntry {
    WireStorageEntry { key: entry.key.clone(), value: entry.value.clone(), seal_wrap: entry.seal_wrap }
}

pub fn storage_entry_from_wire(entry: WireStorageEntry) -> StorageEntry {
    StorageEntry { key: entry.key, value: entry.value, seal_wrap: entry.seal_wrap }
}
