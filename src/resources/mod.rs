//! Cluster resource model
//!
//! The subset of Kubernetes objects the disruption engine reads and writes:
//! pods, budgets, leases and the workloads that own pods. Field names follow
//! the Kubernetes JSON shapes so admission payloads decode directly.

mod budget;
mod lease;
mod pod;
mod workload;

pub use budget::{
    BudgetSpec, IntOrPercent, ProbeSpec, Threshold, ThresholdError, XPodDisruptionBudget,
    XPDB_API_VERSION, XPDB_KIND,
};
pub use lease::{Lease, LeaseSpec};
pub use pod::{
    ConditionStatus, Pod, PodCondition, PodStatus, DISRUPTION_TARGET_CONDITION,
    NODE_LOST_REASON, POD_READY_CONDITION,
};
pub use workload::Workload;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object metadata shared by every resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    /// The owner reference flagged as managing controller, if any
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references
            .iter()
            .find(|r| r.controller.unwrap_or(false))
    }

    /// `namespace/name` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Reference from an object to its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

impl OwnerReference {
    /// Build a controller reference
    pub fn controller(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            controller: Some(true),
        }
    }
}

/// Group part of an `apiVersion` (`apps/v1` -> `apps`, `v1` -> ``)
pub fn api_group(api_version: &str) -> Option<&str> {
    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), None, None) if !version.is_empty() => Some(""),
        (Some(group), Some(version), None) if !group.is_empty() && !version.is_empty() => {
            Some(group)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_group() {
        assert_eq!(api_group("v1"), Some(""));
        assert_eq!(api_group("apps/v1"), Some("apps"));
        assert_eq!(api_group("example.com/v1beta1"), Some("example.com"));
        assert_eq!(api_group("a/b/c"), None);
        assert_eq!(api_group(""), None);
    }

    #[test]
    fn test_controller_reference() {
        let meta = ObjectMeta::new("default", "web-0")
            .with_owner(OwnerReference {
                api_version: "v1".into(),
                kind: "ConfigMap".into(),
                name: "cfg".into(),
                uid: "1".into(),
                controller: None,
            })
            .with_owner(OwnerReference::controller("apps/v1", "StatefulSet", "web", "2"));

        let controller = meta.controller().unwrap();
        assert_eq!(controller.kind, "StatefulSet");
        assert_eq!(meta.key(), "default/web-0");
    }
}
