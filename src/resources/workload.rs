use serde::{Deserialize, Serialize};

use super::{api_group, ObjectMeta};

/// Any object that can own pods: ReplicaSets, Deployments, StatefulSets,
/// ReplicationControllers or custom resources exposing a scale.
///
/// `replicas` is `None` when the kind does not implement scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

impl Workload {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        metadata: ObjectMeta,
        replicas: Option<i32>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata,
            replicas,
        }
    }

    pub fn group(&self) -> Option<&str> {
        api_group(&self.api_version)
    }
}
