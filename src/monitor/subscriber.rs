//! Subscriber callbacks.

use crate::error::SubscriberError;

use super::events::MonitorEvent;

/// Receives monitor events on the worker thread.
///
/// Handlers run inline with the reconciliation pass that produced the event,
/// so they should hand work off rather than block. A handler that returns an
/// error or panics is logged and skipped; other subscribers still receive the
/// event and the monitor's state is unaffected.
pub trait Subscriber: Send {
    /// Handles one event. Events from a single pass arrive in derivation order.
    fn on_event(&mut self, event: &MonitorEvent) -> Result<(), SubscriberError>;
}

impl<F> Subscriber for F
where
    F: FnMut(&MonitorEvent) -> Result<(), SubscriberError> + Send,
{
    fn on_event(&mut self, event: &MonitorEvent) -> Result<(), SubscriberError> {
        self(event)
    }
}
