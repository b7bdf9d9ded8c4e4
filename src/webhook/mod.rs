//! Admission webhook
//!
//! Validates pod deletions and `pods/eviction` creations against the
//! cross-cluster budget that protects the pod.

pub mod admission;
pub mod validation;

pub use admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Verdict};
pub use validation::{PodValidationWebhook, WebhookConfig, WebhookServices};
