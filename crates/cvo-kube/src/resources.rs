//! ---
//! cvo_section: "05-networking-external-interfaces"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Cluster API client and credential loading."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Wire shapes for the handful of core/v1 objects the operator touches.
//!
//! Unknown fields are carried through `extra` so that a read-modify-replace
//! cycle never drops data written by other clients.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    #[serde(default = "v1")]
    pub api_version: String,
    #[serde(default = "config_map_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigMap {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: v1(),
            kind: config_map_kind(),
            metadata,
            data: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default = "v1")]
    pub api_version: String,
    #[serde(default = "event_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub reason: String,
    pub message: String,
    pub source: EventSource,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub count: u32,
    #[serde(rename = "type")]
    pub type_: String,
}

impl Event {
    /// A `Normal` event about `object`, named the way client-side recorders
    /// name them (`<object>.<nanos hex>`).
    pub fn normal(
        object: ObjectReference,
        component: &str,
        reason: &str,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let nanos = at.timestamp_nanos_opt().unwrap_or_default();
        let metadata = ObjectMeta::named(&object.namespace, &format!("{}.{:x}", object.name, nanos));
        Self {
            api_version: v1(),
            kind: event_kind(),
            metadata,
            involved_object: object,
            reason: reason.to_owned(),
            message: message.into(),
            source: EventSource {
                component: component.to_owned(),
                host: None,
            },
            first_timestamp: at,
            last_timestamp: at,
            count: 1,
            type_: "Normal".to_owned(),
        }
    }
}

/// Error body returned by the API server.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Status {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

fn v1() -> String {
    "v1".to_owned()
}

fn config_map_kind() -> String {
    "ConfigMap".to_owned()
}

fn event_kind() -> String {
    "Event".to_owned()
}
