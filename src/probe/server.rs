use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use tower_http::trace::TraceLayer;

use super::{IsDisruptionAllowedRequest, IsDisruptionAllowedResponse, PROBE_PATH};

/// Operator-side decision logic for a disruption probe
///
/// Return `Err` to report that the workload cannot currently tell; the
/// message is passed back to the admission webhook, which blocks the
/// disruption.
#[async_trait]
pub trait DisruptionProbe: Send + Sync + 'static {
    async fn is_disruption_allowed(
        &self,
        request: &IsDisruptionAllowedRequest,
    ) -> Result<bool, String>;
}

async fn is_disruption_allowed(
    State(probe): State<Arc<dyn DisruptionProbe>>,
    Json(request): Json<IsDisruptionAllowedRequest>,
) -> Json<IsDisruptionAllowedResponse> {
    let response = match probe.is_disruption_allowed(&request).await {
        Ok(is_allowed) => IsDisruptionAllowedResponse {
            is_allowed,
            error: String::new(),
        },
        Err(error) => IsDisruptionAllowedResponse {
            is_allowed: false,
            error,
        },
    };
    Json(response)
}

/// Router serving a [`DisruptionProbe`] on the probe path
pub fn create_probe_router(probe: Arc<dyn DisruptionProbe>) -> Router {
    Router::new()
        .route(PROBE_PATH, post(is_disruption_allowed))
        .layer(TraceLayer::new_for_http())
        .with_state(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct DenyPrimary;

    #[async_trait]
    impl DisruptionProbe for DenyPrimary {
        async fn is_disruption_allowed(
            &self,
            request: &IsDisruptionAllowedRequest,
        ) -> Result<bool, String> {
            match request.pod_name.as_str() {
                "db-0" => Ok(false),
                "db-unknown" => Err("replication status unavailable".to_string()),
                _ => Ok(true),
            }
        }
    }

    async fn ask(pod_name: &str) -> IsDisruptionAllowedResponse {
        let app = create_probe_router(Arc::new(DenyPrimary));
        let body = serde_json::json!({
            "podName": pod_name,
            "podNamespace": "shop",
            "xpdbName": "db",
            "xpdbNamespace": "shop",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(PROBE_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_probe_verdicts() {
        assert!(ask("db-1").await.is_allowed);
        assert!(!ask("db-0").await.is_allowed);

        let errored = ask("db-unknown").await;
        assert!(!errored.is_allowed);
        assert_eq!(errored.error, "replication status unavailable");
    }
}
