//! Responses returned by a backend.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::lease::{Auth, Secret};
use super::DataMap;

/// Wrapping metadata of a response-wrapped payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseWrapInfo {
    pub ttl: Duration,
    pub token: String,
    pub accessor: String,
    pub creation_time: Option<DateTime<Utc>>,
    pub wrapped_accessor: String,
    pub wrapped_entity_id: String,
    pub format: String,
    pub creation_path: String,
    pub seal_wrap: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub data: Option<DataMap>,
    pub secret: Option<Secret>,
    pub auth: Option<Auth>,
    pub redirect: String,
    pub warnings: Vec<String>,
    pub wrap_info: Option<ResponseWrapInfo>,
}

impl Response {
    /// Response carrying only data.
    pub fn with_data(data: DataMap) -> Self {
        Self { data: Some(data), ..Default::default() }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}
