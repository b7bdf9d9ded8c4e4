use serde::{Deserialize, Serialize};

use super::{ObjectMeta, OwnerReference};

pub const POD_READY_CONDITION: &str = "Ready";
pub const DISRUPTION_TARGET_CONDITION: &str = "DisruptionTarget";
pub const NODE_LOST_REASON: &str = "NodeLost";

/// Condition status as reported by the kubelet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PodCondition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PodCondition>,
}

/// A pod as seen by the admission pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Pod".to_string()
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(namespace, name),
            status: PodStatus::default(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.owner_references.push(owner);
        self
    }

    /// Set the Ready condition
    pub fn with_ready(mut self, ready: bool) -> Self {
        let status = if ready {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        self.set_condition(PodCondition::new(POD_READY_CONDITION, status));
        self
    }

    pub fn set_condition(&mut self, condition: PodCondition) {
        self.status
            .conditions
            .retain(|c| c.condition_type != condition.condition_type);
        self.status.conditions.push(condition);
    }

    pub fn condition(&self, condition_type: &str) -> Option<&PodCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn is_ready(&self) -> bool {
        self.condition(POD_READY_CONDITION)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Healthy pods count toward a budget's available replicas
    pub fn is_healthy(&self) -> bool {
        !self.is_terminating() && self.is_ready()
    }

    /// The DisruptionTarget condition, when it is set to True
    pub fn disruption_target(&self) -> Option<&PodCondition> {
        self.condition(DISRUPTION_TARGET_CONDITION)
            .filter(|c| c.status == ConditionStatus::True)
    }

    pub fn is_node_lost(&self) -> bool {
        self.status.reason.as_deref() == Some(NODE_LOST_REASON)
    }

    pub fn controller(&self) -> Option<&OwnerReference> {
        self.metadata.controller()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_health() {
        let pod = Pod::new("default", "web-0").with_ready(true);
        assert!(pod.is_ready());
        assert!(pod.is_healthy());

        let pod = Pod::new("default", "web-1").with_ready(false);
        assert!(!pod.is_healthy());

        let mut pod = Pod::new("default", "web-2").with_ready(true);
        pod.metadata.deletion_timestamp = Some(Utc::now());
        assert!(pod.is_terminating());
        assert!(!pod.is_healthy());

        // No Ready condition at all
        assert!(!Pod::new("default", "web-3").is_healthy());
    }

    #[test]
    fn test_decode_admission_pod() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-0",
                "namespace": "shop",
                "uid": "abc",
                "labels": {"app": "web"},
                "ownerReferences": [{
                    "apiVersion": "apps/v1",
                    "kind": "StatefulSet",
                    "name": "web",
                    "uid": "ss-1",
                    "controller": true
                }]
            },
            "spec": {"containers": [{"name": "web", "image": "nginx"}]},
            "status": {
                "phase": "Running",
                "conditions": [
                    {"type": "Ready", "status": "True"},
                    {"type": "DisruptionTarget", "status": "True", "reason": "EvictionByEvictionAPI"}
                ]
            }
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.namespace(), "shop");
        assert!(pod.is_healthy());
        assert!(pod.disruption_target().is_some());
        assert_eq!(pod.controller().unwrap().name, "web");
    }

    #[test]
    fn test_node_lost() {
        let mut pod = Pod::new("default", "web-0");
        assert!(!pod.is_node_lost());
        pod.status.reason = Some(NODE_LOST_REASON.to_string());
        assert!(pod.is_node_lost());
    }
}
