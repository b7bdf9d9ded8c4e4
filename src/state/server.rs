use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::messages::{
    ErrorResponse, GetStateRequest, GetStateResponse, LockRequest, LockResponse, UnlockRequest,
    UnlockResponse, GET_STATE_PATH, LOCK_PATH, UNLOCK_PATH,
};
use crate::budget::BudgetService;
use crate::lock::LockService;
use crate::selector::LabelSelector;

/// Shared state of the state server
#[derive(Clone)]
pub struct StateServerState {
    pub locks: Arc<LockService>,
    pub budgets: Arc<BudgetService>,
}

impl StateServerState {
    pub fn new(locks: Arc<LockService>, budgets: Arc<BudgetService>) -> Self {
        Self { locks, budgets }
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Take the local lease on behalf of a remote cluster
pub async fn lock(
    State(state): State<StateServerState>,
    Json(request): Json<LockRequest>,
) -> Json<LockResponse> {
    let selector = match LabelSelector::try_from(request.label_selector) {
        Ok(selector) => selector,
        Err(e) => {
            return Json(LockResponse {
                acquired: false,
                error: e.to_string(),
            })
        }
    };

    match state
        .locks
        .local_lock(&request.lease_holder_identity, &request.namespace, &selector)
        .await
    {
        Ok(()) => {
            debug!(holder = %request.lease_holder_identity, namespace = %request.namespace, "Remote lock acquired");
            Json(LockResponse {
                acquired: true,
                error: String::new(),
            })
        }
        Err(e) => {
            info!(holder = %request.lease_holder_identity, namespace = %request.namespace, error = %e, "Remote lock refused");
            Json(LockResponse {
                acquired: false,
                error: e.to_string(),
            })
        }
    }
}

/// Release the local lease on behalf of a remote cluster
pub async fn unlock(
    State(state): State<StateServerState>,
    Json(request): Json<UnlockRequest>,
) -> Json<UnlockResponse> {
    let selector = match LabelSelector::try_from(request.label_selector) {
        Ok(selector) => selector,
        Err(e) => {
            return Json(UnlockResponse {
                unlocked: false,
                error: e.to_string(),
            })
        }
    };

    match state
        .locks
        .local_unlock(&request.lease_holder_identity, &request.namespace, &selector)
        .await
    {
        Ok(()) => Json(UnlockResponse {
            unlocked: true,
            error: String::new(),
        }),
        Err(e) => {
            info!(holder = %request.lease_holder_identity, namespace = %request.namespace, error = %e, "Remote unlock refused");
            Json(UnlockResponse {
                unlocked: false,
                error: e.to_string(),
            })
        }
    }
}

/// Report local expected and healthy pod counts
pub async fn get_state(
    State(state): State<StateServerState>,
    Json(request): Json<GetStateRequest>,
) -> Result<Json<GetStateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let selector = LabelSelector::try_from(request.label_selector).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let counts = state
        .budgets
        .pod_counts(&request.namespace, &selector)
        .await
        .map_err(|e| {
            error!(namespace = %request.namespace, error = %e, "Failed to get pod counts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("unable to get pod counts: {}", e),
                }),
            )
        })?;

    Ok(Json(GetStateResponse {
        desired_healthy: counts.expected,
        healthy: counts.healthy,
    }))
}

/// Create the state server router
pub fn create_state_router(state: StateServerState) -> Router {
    Router::new()
        .route(LOCK_PATH, post(lock))
        .route(UNLOCK_PATH, post(unlock))
        .route(GET_STATE_PATH, post(get_state))
        .route("/healthz", get(health))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
