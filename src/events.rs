//! Disruption events
//!
//! Outcomes worth surfacing to operators are recorded as events against the
//! pod or budget involved. [`LoggingRecorder`] emits them as structured logs;
//! [`MemoryRecorder`] keeps them for inspection.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::resources::{Pod, XPodDisruptionBudget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventReason {
    /// A pod matched more than one budget
    InvalidConfiguration,
    /// A disruption was refused
    Blocked,
    /// A disruption was admitted
    Accepted,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::InvalidConfiguration => "InvalidConfiguration",
            EventReason::Blocked => "Blocked",
            EventReason::Accepted => "Accepted",
        }
    }
}

/// Object an event is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvolvedObject {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub involved: InvolvedObject,
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn for_pod(pod: &Pod, event_type: EventType, reason: EventReason, message: String) -> Self {
        Self {
            involved: InvolvedObject {
                kind: pod.kind.clone(),
                namespace: pod.metadata.namespace.clone(),
                name: pod.metadata.name.clone(),
            },
            event_type,
            reason,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn for_budget(
        budget: &XPodDisruptionBudget,
        event_type: EventType,
        reason: EventReason,
        message: String,
    ) -> Self {
        Self {
            involved: InvolvedObject {
                kind: budget.kind.clone(),
                namespace: budget.metadata.namespace.clone(),
                name: budget.metadata.name.clone(),
            },
            event_type,
            reason,
            message,
            timestamp: Utc::now(),
        }
    }
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, event: Event);
}

/// Emits events as log lines
pub struct LoggingRecorder;

impl EventRecorder for LoggingRecorder {
    fn record(&self, event: Event) {
        let object = format!(
            "{}/{}/{}",
            event.involved.kind, event.involved.namespace, event.involved.name
        );
        match event.event_type {
            EventType::Normal => {
                info!(object = %object, reason = event.reason.as_str(), "{}", event.message)
            }
            EventType::Warning => {
                warn!(object = %object, reason = event.reason.as_str(), "{}", event.message)
            }
        }
    }
}

/// Keeps every recorded event in memory
#[derive(Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, reason: EventReason) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.reason == reason)
            .count()
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
