//! Broker-ready message produced by a validated handler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header names stamped by the dispatcher on every outgoing message.
pub mod headers {
    pub const EVENT_ID: &str = "event-id";
    pub const QUEUE: &str = "queue";
    pub const CREATED_AT: &str = "created-at";
    pub const SOURCE: &str = "source";
}

/// Validated body plus string headers.
///
/// The `event-id` header is stable across redeliveries, so consumers can
/// deduplicate on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub body: serde_json::Value,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Message {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Wire form of the body (JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }
}
