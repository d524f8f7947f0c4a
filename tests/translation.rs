//! Wire shapes seen by a peer process.

use backend_plugin::logical::{
    DataMap, LeaseOptions, LogicalError, Operation, Request, Response, Secret, StorageEntry,
    SENTINELS,
};
use backend_plugin::translate::{
    decode_map, encode_map, error_from_flat, error_from_wire, error_to_flat, error_to_wire,
    request_from_wire, request_to_wire, response_from_wire, response_to_wire,
    storage_entry_from_wire, storage_entry_to_wire, FlatError, WireError, WireRequest,
    WireResponse, WireStorageEntry,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

fn through_json<T: serde::Serialize + serde::de::DeserializeOwned>(value: &T) -> T {
    let text = serde_json::to_string(value).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_every_operation_crosses_the_wire() {
    for op in Operation::ALL {
        let req = Request::new(op, "path");
        let wire: WireRequest = through_json(&request_to_wire(&req).unwrap());
        assert_eq!(wire.operation, op);
        assert_eq!(serde_json::to_value(op).unwrap(), json!(op.as_str()));
    }
}

#[test]
fn test_request_data_travels_as_json_text() {
    let mut data = DataMap::new();
    data.insert("password".into(), json!("hunter2"));
    let req = Request::new(Operation::Update, "creds").with_data(data.clone());

    let value = serde_json::to_value(request_to_wire(&req).unwrap()).unwrap();
    assert_eq!(value["data"], json!("{\"password\":\"hunter2\"}"));
    assert_eq!(value["operation"], json!("update"));
    assert!(value.get("secret").is_none());

    let back = request_from_wire(serde_json::from_value(value).unwrap()).unwrap();
    assert_eq!(back.data, Some(data));
}

#[test]
fn test_minimal_peer_request_decodes() {
    // A peer may omit every defaulted field.
    let wire: WireRequest =
        serde_json::from_value(json!({"id": "r1", "operation": "list", "path": "roles/"})).unwrap();
    let req = request_from_wire(wire).unwrap();
    assert_eq!(req.operation, Operation::List);
    assert_eq!(req.data, None);
    assert!(req.headers.is_empty());
}

#[test]
fn test_response_absent_vs_empty_data() {
    let absent = Response::default();
    let empty = Response::with_data(DataMap::new());

    let absent_back = response_from_wire(through_json(&response_to_wire(&absent).unwrap())).unwrap();
    let empty_back = response_from_wire(through_json(&response_to_wire(&empty).unwrap())).unwrap();
    assert_eq!(absent_back.data, None);
    assert_eq!(empty_back.data, Some(DataMap::new()));
}

#[test]
fn test_secret_lease_survives() {
    let mut secret = Secret::new(
        LeaseOptions::new(Duration::from_secs(90)).renewable(true).with_max_ttl(Duration::from_secs(600)),
    );
    let mut internal = DataMap::new();
    internal.insert("username".into(), json!("v-token-abc"));
    secret.internal_data = Some(internal);

    let resp = Response { secret: Some(secret.clone()), ..Default::default() };
    let wire: WireResponse = through_json(&response_to_wire(&resp).unwrap());
    let back = response_from_wire(wire).unwrap();
    assert_eq!(back.secret, Some(secret));
}

#[test]
fn test_storage_entry_shape() {
    let entry = StorageEntry { key: "k".into(), value: vec![0, 159, 146, 150], seal_wrap: true };
    let value = serde_json::to_value(storage_entry_to_wire(&entry)).unwrap();
    assert_eq!(value, json!({"key": "k", "value": "AJ+Slg==", "seal_wrap": true}));

    let missing_flag: WireStorageEntry =
        serde_json::from_value(json!({"key": "k", "value": ""})).unwrap();
    assert!(!missing_flag.seal_wrap);
    assert!(serde_json::from_value::<WireStorageEntry>(json!({"key": "k", "value": "%%"})).is_err());
}

#[test]
fn test_typed_errors_over_json() {
    let mut errors = SENTINELS.to_vec();
    errors.push(LogicalError::coded(503, "sealed"));
    errors.push(LogicalError::BadRequest("missing role".into()));
    errors.push(LogicalError::user("no such user"));
    errors.push(LogicalError::other("boom"));
    errors.push(LogicalError::Transport("plugin failed to communicate: stream 5 is closed".into()));

    for err in errors {
        let wire: WireError = through_json(&error_to_wire(&err));
        assert_eq!(error_from_wire(wire), err);

        let flat: FlatError = through_json(&error_to_flat(&err));
        assert_eq!(error_from_flat(flat), err);
    }
}

#[test]
fn test_flat_error_from_bare_message() {
    let flat: FlatError = serde_json::from_value(json!({"message": "unsupported operation"})).unwrap();
    assert_eq!(error_from_flat(flat), LogicalError::UnsupportedOperation);

    let flat: FlatError = serde_json::from_value(json!({"message": "teapot", "code": 418})).unwrap();
    assert_eq!(error_from_flat(flat), LogicalError::other("teapot"));
}

proptest! {
    #[test]
    fn prop_storage_value_is_standard_base64(key in "[a-z/]{0,24}", value in proptest::collection::vec(any::<u8>(), 0..256), seal_wrap in any::<bool>()) {
        let entry = StorageEntry { key, value, seal_wrap };
        let json = serde_json::to_value(storage_entry_to_wire(&entry)).unwrap();
        prop_assert_eq!(&json["value"], &Value::String(STANDARD.encode(&entry.value)));

        let back: WireStorageEntry = serde_json::from_value(json).unwrap();
        prop_assert_eq!(storage_entry_from_wire(back), entry);
    }

    #[test]
    fn prop_data_maps_survive_encoding(entries in proptest::collection::btree_map("[a-z_]{1,12}", any::<i64>(), 0..8)) {
        let map: DataMap = entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
        let encoded = encode_map(Some(&map)).unwrap();
        prop_assert!(!encoded.is_empty());
        prop_assert_eq!(decode_map(&encoded).unwrap(), Some(map));
    }
}
