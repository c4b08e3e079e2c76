//! Channel-backed subscriptions.
//!
//! An `EventStream` lets a caller pull events at its own pace instead of
//! running a callback on the worker. The worker side never waits on the
//! reader: once the buffer (`MonitorConfig::stream_capacity`) is full, new
//! events are dropped and counted in `MonitorStats::dropped_events`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::{ExecutionError, FleetError, FleetResult, SubscriberError};

use super::dispatcher::ControlMsg;
use super::events::{MonitorEvent, SubscriptionId};
use super::subscriber::Subscriber;

/// Buffered receiver for every event the monitor dispatches.
///
/// Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct EventStream {
    subscription_id: SubscriptionId,
    rx: Receiver<MonitorEvent>,
    control_tx: Sender<ControlMsg>,
    unregistered: AtomicBool,
}

impl EventStream {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        rx: Receiver<MonitorEvent>,
        control_tx: Sender<ControlMsg>,
    ) -> Self {
        Self {
            subscription_id,
            rx,
            control_tx,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Stops delivery to this stream. Idempotent.
    ///
    /// Events already in the buffer stay readable.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.control_tx.send(ControlMsg::Unregister {
            subscription_id: self.subscription_id,
        });
    }

    /// Waits for the next event. Fails once the monitor has shut down and the
    /// buffer is empty.
    pub fn recv(&self) -> FleetResult<MonitorEvent> {
        self.rx.recv().map_err(|_| {
            FleetError::Execution(ExecutionError::Disconnected {
                path: "event_stream".to_string(),
            })
        })
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> FleetResult<MonitorEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FleetError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => FleetError::Execution(ExecutionError::Disconnected {
                path: "event_stream".to_string(),
            }),
        })
    }

    /// The next buffered event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<MonitorEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Worker-side half of an `EventStream`. A full or closed buffer drops the
/// event and bumps the shared `dropped_events` counter.
pub(crate) struct StreamForwarder {
    pub(crate) tx: Sender<MonitorEvent>,
    pub(crate) dropped_events: Arc<AtomicU64>,
}

impl Subscriber for StreamForwarder {
    fn on_event(&mut self, event: &MonitorEvent) -> Result<(), SubscriberError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}
