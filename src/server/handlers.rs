use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::VALIDATE_PATH;
use crate::server::state::AppState;
use crate::state::messages::ErrorResponse;
use crate::webhook::AdmissionReview;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness endpoint
pub async fn ready() -> impl IntoResponse {
    StatusCode::OK
}

/// Prometheus text exposition of the webhook counters
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Admission review endpoint
pub async fn validate(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview>,
) -> Result<Json<AdmissionReview>, (StatusCode, Json<ErrorResponse>)> {
    let Some(request) = review.request else {
        warn!("Admission review without a request");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "admission review has no request".to_string(),
            }),
        ));
    };

    let response = state.webhook.handle(&request).await;
    Ok(Json(AdmissionReview::response(response)))
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(ready))
        .route("/metrics", get(metrics))
        .route(VALIDATE_PATH, post(validate))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
