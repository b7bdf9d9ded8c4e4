use serde::{Deserialize, Serialize};

use crate::selector::WireLabelSelector;

pub const LOCK_PATH: &str = "/v1/state/lock";
pub const UNLOCK_PATH: &str = "/v1/state/unlock";
pub const GET_STATE_PATH: &str = "/v1/state/get";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub lease_holder_identity: String,
    pub namespace: String,
    #[serde(default)]
    pub label_selector: WireLabelSelector,
}

/// Lock outcome; failures are reported in `error`, never as HTTP errors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    #[serde(default)]
    pub acquired: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub lease_holder_identity: String,
    pub namespace: String,
    #[serde(default)]
    pub label_selector: WireLabelSelector,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStateRequest {
    pub namespace: String,
    #[serde(default)]
    pub label_selector: WireLabelSelector,
}

/// Local pod counts of the answering cluster.
///
/// `desired_healthy` carries the expected pod count (the sum of controller
/// scale), not a threshold; the name is kept for wire compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStateResponse {
    #[serde(default)]
    pub desired_healthy: i32,
    #[serde(default)]
    pub healthy: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
