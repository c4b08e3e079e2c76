//! Event types delivered to subscribers.
//!
//! These types are serializable so embedders can forward them to dashboards
//! or schedulers without re-shaping them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceRecord;
use crate::reconcile::Transition;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// One device changed state.
    Transition(Transition),

    /// The device source failed; the table was left untouched.
    RefreshFailed {
        error: String,
    },

    /// Copy of the whole table after a successful pass, in id order.
    FullState {
        devices: Vec<DeviceRecord>,
    },
}

/// A dispatched monitor event.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Host labels committed at the time the event was created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_labels: Vec<String>,
    pub payload: EventPayload,
}

impl MonitorEvent {
    /// Stamps `payload` with a fresh id and the current time.
    #[must_use]
    pub fn new(payload: EventPayload, host_labels: Vec<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            host_labels,
            payload,
        }
    }

    /// The transition carried by this event, if any.
    #[must_use]
    pub fn as_transition(&self) -> Option<&Transition> {
        match &self.payload {
            EventPayload::Transition(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true for refresh failure markers.
    #[must_use]
    pub const fn is_refresh_failure(&self) -> bool {
        matches!(self.payload, EventPayload::RefreshFailed { .. })
    }
}
