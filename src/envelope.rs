//! Wire envelope shared by every API version

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::GroupVersionKind;

/// Object metadata.
///
/// One type for all versions; conversions copy it as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_timestamp: Option<DateTime<Utc>>,
}

/// `{apiVersion, kind, metadata, spec, status}`
///
/// Untyped (`serde_json::Value`) by default; generated converters use it with
/// concrete Spec/Status types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedEnvelope<Spec = Value, Status = Value> {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: Spec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl<Spec, Status> VersionedEnvelope<Spec, Status> {
    pub fn new(gvk: &GroupVersionKind, metadata: Metadata, spec: Spec, status: Option<Status>) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            metadata,
            spec,
            status,
        }
    }

    /// Whether this envelope claims to be `gvk`
    pub fn is(&self, gvk: &GroupVersionKind) -> bool {
        self.kind == gvk.kind && self.api_version == gvk.api_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let gvk = GroupVersionKind::new("infra.example.io", "v1", "Device");
        let metadata = Metadata {
            name: "edge-1".into(),
            ..Default::default()
        };
        let envelope: VersionedEnvelope = VersionedEnvelope::new(&gvk, metadata, json!({"ipAddress": "10.0.0.5"}), None);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "apiVersion": "infra.example.io/v1",
                "kind": "Device",
                "metadata": {"name": "edge-1"},
                "spec": {"ipAddress": "10.0.0.5"}
            })
        );
        assert!(envelope.is(&gvk));
    }

    #[test]
    fn test_metadata_timestamps_are_camel_case() {
        let raw = json!({
            "name": "edge-1",
            "uid": "abc",
            "creationTimestamp": "2024-05-01T10:00:00Z"
        });
        let metadata: Metadata = serde_json::from_value(raw).unwrap();
        assert_eq!(metadata.uid.as_deref(), Some("abc"));
        assert!(metadata.creation_timestamp.is_some());
        assert!(metadata.update_timestamp.is_none());
    }
}
