use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::warn;

use super::{ClientError, EndpointClient, EndpointPool};

/// One endpoint's failure within a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub reason: String,
}

/// Every failure of a fan-out, one per failing endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} of {} remote endpoint(s) failed: {}", .failures.len(), .total, describe(.failures))]
pub struct FanOutError {
    pub total: usize,
    pub failures: Vec<EndpointFailure>,
}

fn describe(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.endpoint, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Call every endpoint concurrently, each bounded by `timeout`
///
/// Succeeds only if every endpoint succeeds; results keep endpoint order.
pub async fn fan_out<C, T, F, Fut>(
    pool: &EndpointPool<C>,
    endpoints: &[String],
    timeout: Duration,
    call: F,
) -> Result<Vec<T>, FanOutError>
where
    C: EndpointClient,
    F: Fn(Arc<C>) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let calls = endpoints.iter().map(|endpoint| {
        let client = pool.get(endpoint);
        let call = &call;
        async move {
            let client = client.map_err(|e| e.to_string())?;
            match tokio::time::timeout(timeout, call(client)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
            }
        }
    });

    let mut values = Vec::with_capacity(endpoints.len());
    let mut failures = Vec::new();
    for (endpoint, result) in endpoints.iter().zip(join_all(calls).await) {
        match result {
            Ok(value) => values.push(value),
            Err(reason) => {
                warn!(endpoint = %endpoint, reason = %reason, "Remote endpoint call failed");
                failures.push(EndpointFailure {
                    endpoint: endpoint.clone(),
                    reason,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(values)
    } else {
        Err(FanOutError {
            total: endpoints.len(),
            failures,
        })
    }
}
