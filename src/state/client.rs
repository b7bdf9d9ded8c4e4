use serde::de::DeserializeOwned;
use serde::Serialize;

use super::messages::{
    GetStateRequest, GetStateResponse, LockRequest, LockResponse, UnlockRequest, UnlockResponse,
    GET_STATE_PATH, LOCK_PATH, UNLOCK_PATH,
};
use crate::metrics::SharedMetrics;
use crate::remote::{base_url, build_http_client, post_json, ClientError, ConnectContext, EndpointClient};

// ============================================================================
// SBIO: I/O implementation (HTTP client for a remote state server)
// ============================================================================

/// Client for one remote cluster's state server
pub struct StateClient {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    metrics: SharedMetrics,
}

impl StateClient {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn lock(&self, request: &LockRequest) -> Result<LockResponse, ClientError> {
        self.call("lock", LOCK_PATH, request).await
    }

    pub async fn unlock(&self, request: &UnlockRequest) -> Result<UnlockResponse, ClientError> {
        self.call("unlock", UNLOCK_PATH, request).await
    }

    pub async fn get_state(
        &self,
        request: &GetStateRequest,
    ) -> Result<GetStateResponse, ClientError> {
        self.call("get_state", GET_STATE_PATH, request).await
    }

    async fn call<Req, Resp>(
        &self,
        method: &'static str,
        path: &str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let result = post_json(&self.client, &url, request).await;
        self.metrics
            .observe_remote_call(&self.endpoint, method, result.is_ok());
        result
    }
}

impl EndpointClient for StateClient {
    fn connect(endpoint: &str, context: &ConnectContext) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(&context.tls)?,
            base_url: base_url(endpoint, &context.tls)?,
            endpoint: endpoint.to_string(),
            metrics: context.metrics.clone(),
        })
    }
}
