use std::sync::Arc;

use crate::metrics::SharedMetrics;
use crate::webhook::PodValidationWebhook;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub webhook: Arc<PodValidationWebhook>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(webhook: Arc<PodValidationWebhook>, metrics: SharedMetrics) -> Self {
        Self { webhook, metrics }
    }
}
