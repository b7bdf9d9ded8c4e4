//! Disruption probes
//!
//! A budget may name a probe endpoint run by the workload's operator, which
//! gets the final say on whether a pod may be disrupted (for instance, a
//! database refusing to lose a replica mid-election). The probe is only asked
//! after the budget itself allows the disruption.

pub mod server;

pub use server::{create_probe_router, DisruptionProbe};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::metrics::SharedMetrics;
use crate::remote::{
    base_url, build_http_client, post_json, ClientError, ConnectContext, EndpointClient,
    EndpointPool,
};
use crate::resources::{Pod, XPodDisruptionBudget};

pub const PROBE_PATH: &str = "/v1/disruption-probe";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsDisruptionAllowedRequest {
    pub pod_name: String,
    pub pod_namespace: String,
    pub xpdb_name: String,
    pub xpdb_namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsDisruptionAllowedResponse {
    #[serde(default)]
    pub is_allowed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("disruption probe at '{endpoint}' could not be reached: {source}")]
    Transport {
        endpoint: String,
        source: ClientError,
    },

    #[error("disruption probe at '{endpoint}' timed out after {after_ms}ms")]
    Timeout { endpoint: String, after_ms: u128 },

    #[error("disruption probe returned an error: {0}")]
    Rejected(String),
}

// ============================================================================
// SBIO: I/O implementation (HTTP client for a probe endpoint)
// ============================================================================

pub struct ProbeClient {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    metrics: SharedMetrics,
}

impl ProbeClient {
    pub async fn is_disruption_allowed(
        &self,
        request: &IsDisruptionAllowedRequest,
    ) -> Result<IsDisruptionAllowedResponse, ClientError> {
        let url = format!("{}{}", self.base_url, PROBE_PATH);
        let result = post_json(&self.client, &url, request).await;
        self.metrics
            .observe_remote_call(&self.endpoint, "is_disruption_allowed", result.is_ok());
        result
    }
}

impl EndpointClient for ProbeClient {
    fn connect(endpoint: &str, context: &ConnectContext) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(&context.tls)?,
            base_url: base_url(endpoint, &context.tls)?,
            endpoint: endpoint.to_string(),
            metrics: context.metrics.clone(),
        })
    }
}

pub type ProbeClientPool = EndpointPool<ProbeClient>;

/// Asks a budget's probe whether a pod may be disrupted
pub struct ProbeService {
    pool: ProbeClientPool,
    timeout: Duration,
}

impl ProbeService {
    pub fn new(pool: ProbeClientPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Allowed when the budget declares no enabled probe
    pub async fn can_pod_be_disrupted(
        &self,
        pod: &Pod,
        budget: &XPodDisruptionBudget,
    ) -> Result<bool, ProbeError> {
        let Some(endpoint) = budget.probe_endpoint() else {
            return Ok(true);
        };

        let client = self.pool.get(endpoint).map_err(|e| ProbeError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let request = IsDisruptionAllowedRequest {
            pod_name: pod.metadata.name.clone(),
            pod_namespace: pod.metadata.namespace.clone(),
            xpdb_name: budget.metadata.name.clone(),
            xpdb_namespace: budget.metadata.namespace.clone(),
        };

        let response = tokio::time::timeout(self.timeout, client.is_disruption_allowed(&request))
            .await
            .map_err(|_| ProbeError::Timeout {
                endpoint: endpoint.to_string(),
                after_ms: self.timeout.as_millis(),
            })?
            .map_err(|e| ProbeError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            })?;

        if !response.error.is_empty() {
            return Err(ProbeError::Rejected(response.error));
        }

        info!(
            pod = %pod.metadata.key(),
            xpdb = %budget.metadata.key(),
            allowed = response.is_allowed,
            "Disruption probe verdict"
        );
        Ok(response.is_allowed)
    }
}
