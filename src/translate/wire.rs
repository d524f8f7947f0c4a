//! Wire representations of the domain types.
//!
//! These structs form the versioned schema both processes agree on. Opaque
//! maps travel as JSON text: the empty string means "absent" and `"{}"` means
//! "present but empty". Durations use serde's lossless `{secs, nanos}` form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::logical::Operation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireLeaseOptions {
    pub ttl: Duration,
    pub max_ttl: Duration,
    pub renewable: bool,
    pub increment: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireSecret {
    pub lease_options: WireLeaseOptions,
    #[serde(default)]
    pub internal_data: String,
    #[serde(default)]
    pub lease_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireAlias {
    pub mount_type: String,
    pub mount_accessor: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireAuth {
    pub lease_options: WireLeaseOptions,
    #[serde(default)]
    pub internal_data: String,
    pub display_name: String,
    pub policies: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub client_token: String,
    pub accessor: String,
    pub period: Duration,
    pub explicit_max_ttl: Duration,
    pub num_uses: u32,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<WireAlias>,
    #[serde(default)]
    pub group_aliases: Vec<WireAlias>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRequestWrapInfo {
    pub ttl: Duration,
    pub format: String,
    pub seal_wrap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    #[serde(default)]
    pub replication_cluster: String,
    pub operation: Operation,
    pub path: String,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<WireSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<WireAuth>,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub client_token: String,
    #[serde(default)]
    pub client_token_accessor: String,
    #[serde(default)]
    pub client_token_remaining_uses: i32,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mount_point: String,
    #[serde(default)]
    pub mount_type: String,
    #[serde(default)]
    pub mount_accessor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_info: Option<WireRequestWrapInfo>,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub policy_override: bool,
    #[serde(default)]
    pub unauthenticated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireResponseWrapInfo {
    pub ttl: Duration,
    pub token: String,
    pub accessor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    pub wrapped_accessor: String,
    pub wrapped_entity_id: String,
    pub format: String,
    pub creation_path: String,
    pub seal_wrap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<WireSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<WireAuth>,
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_info: Option<WireResponseWrapInfo>,
}

/// `{ "key": string, "value": base64, "seal_wrap": bool }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStorageEntry {
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub seal_wrap: bool,
}

/// Serde adapter encoding byte buffers as standard base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_entry_shape() {
        let entry =
            WireStorageEntry { key: "foo".into(), value: b"bar".to_vec(), seal_wrap: true };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"key": "foo", "value": "YmFy", "seal_wrap": true}));
    }

    #[test]
    fn test_storage_entry_rejects_bad_base64() {
        let result = serde_json::from_str::<WireStorageEntry>(r#"{"key":"k","value":"**"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_is_lossless() {
        let info = WireRequestWrapInfo {
            ttl: Duration::new(7, 123_456_789),
            format: "jwt".into(),
            seal_wrap: false,
        };
        let back: WireRequestWrapInfo =
            serde_json::from_str(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(back.ttl, Duration::new(7, 123_456_789));
    }
}
