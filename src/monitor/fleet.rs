//! Caller-facing monitor handle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Sender, TrySendError};
use serde::Serialize;

use crate::allocation::Override;
use crate::device::{DeviceId, DeviceRecord};
use crate::source::SnapshotSource;

use super::config::MonitorConfig;
use super::dispatcher::{lock, worker_loop, ControlMsg, FleetState, Shared};
use super::events::{MonitorEvent, SubscriptionId};
use super::stream::{EventStream, StreamForwarder};
use super::subscriber::Subscriber;

/// Point-in-time counters for a running monitor.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub refreshes_completed: u64,
    pub refreshes_failed: u64,
    /// Triggers merged into an already pending refresh.
    pub triggers_coalesced: u64,
    pub subscriber_failures: u64,
    /// Events not delivered because an `EventStream` buffer was full.
    pub dropped_events: u64,
}

/// Handle for a callback subscription.
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep the
/// callback registered for the monitor's whole lifetime.
#[must_use = "dropping a Subscription unsubscribes it"]
#[derive(Debug)]
pub struct Subscription {
    subscription_id: SubscriptionId,
    control_tx: Sender<ControlMsg>,
    unregistered: AtomicBool,
}

impl Subscription {
    /// The id backing this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Removes the subscriber. Idempotent and non-blocking; events already
    /// being dispatched may still reach it.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.control_tx.send(ControlMsg::Unregister {
            subscription_id: self.subscription_id,
        });
    }

    /// Keeps the subscriber registered without holding the handle.
    pub fn detach(self) {
        self.unregistered.store(true, Ordering::Release);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Tracks the availability of a device fleet.
///
/// All methods return promptly: device listing, reconciliation and dispatch
/// happen on a dedicated worker thread, so a hung device source stalls future
/// refreshes but never the caller.
///
/// ```
/// use std::time::Duration;
/// use fleetmon::device::snapshot_from;
/// use fleetmon::{DeviceState, FleetMonitor, MonitorConfig, SourceError};
///
/// let monitor = FleetMonitor::new(MonitorConfig::default());
/// monitor.set_snapshot_source(|| -> Result<_, SourceError> {
///     Ok(snapshot_from([("devA", "online")]))
/// });
///
/// let stream = monitor.subscribe_stream();
/// monitor.trigger_refresh();
///
/// let event = stream.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert_eq!(event.as_transition().unwrap().current, DeviceState::Available);
/// monitor.shutdown();
/// ```
pub struct FleetMonitor {
    shared: Arc<Shared>,
    trigger_tx: Sender<()>,
    control_tx: Sender<ControlMsg>,
    join: Option<JoinHandle<()>>,
}

impl FleetMonitor {
    /// Starts a monitor with no device source.
    pub fn new(cfg: MonitorConfig) -> Self {
        let (trigger_tx, trigger_rx) = bounded::<()>(1);
        let (control_tx, control_rx) = unbounded::<ControlMsg>();
        let (outbox_tx, outbox_rx) = unbounded::<MonitorEvent>();

        let worker_name = cfg.worker_name.clone();
        let shared = Arc::new(Shared::new(cfg, outbox_tx));

        let thread_shared = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name(worker_name)
            .spawn(move || worker_loop(thread_shared, trigger_rx, control_rx, outbox_rx))
            .expect("failed to spawn fleetmon worker");

        Self {
            shared,
            trigger_tx,
            control_tx,
            join: Some(join),
        }
    }

    /// Starts a monitor with `source` already installed.
    pub fn with_source(cfg: MonitorConfig, source: impl SnapshotSource + 'static) -> Self {
        let monitor = Self::new(cfg);
        monitor.set_snapshot_source(source);
        monitor
    }

    /// Replaces the device source. A fetch already running keeps the source
    /// it started with; the next trigger uses this one.
    pub fn set_snapshot_source(&self, source: impl SnapshotSource + 'static) {
        *lock(&self.shared.source) = Some(Arc::new(source));
    }

    /// Requests a refresh and returns immediately.
    ///
    /// At most one refresh runs and at most one more is queued; extra triggers
    /// fold into the queued one, which still observes the latest device state.
    pub fn trigger_refresh(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                self.shared
                    .counters
                    .triggers_coalesced
                    .fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Refresh already pending, coalescing trigger");
            }
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("Refresh triggered after worker shutdown");
            }
        }
    }

    /// Marks `id` allocated, effective immediately.
    pub fn allocate(&self, id: impl Into<DeviceId>) {
        let id = id.into();
        let mut state = lock(&self.shared.state);
        let FleetState { table, tracker } = &mut *state;
        if let Some(t) = tracker.allocate(table, &id, Utc::now()) {
            self.shared.enqueue_transition(t);
        }
        tracing::debug!(device = %id, "Device allocated");
    }

    /// Marks `id` ignored, effective immediately.
    pub fn ignore(&self, id: impl Into<DeviceId>) {
        let id = id.into();
        let mut state = lock(&self.shared.state);
        let FleetState { table, tracker } = &mut *state;
        if let Some(t) = tracker.ignore(table, &id, Utc::now()) {
            self.shared.enqueue_transition(t);
        }
        tracing::debug!(device = %id, "Device ignored");
    }

    /// Clears any override on `id`. The natural state returns on the next
    /// refresh, which is scheduled here when `refresh_on_release` is set.
    pub fn release(&self, id: impl Into<DeviceId>) -> Option<Override> {
        let id = id.into();
        let released = lock(&self.shared.state).tracker.release(&id);
        if released.is_some() {
            tracing::debug!(device = %id, "Device released");
            if self.shared.cfg.refresh_on_release {
                self.trigger_refresh();
            }
        }
        released
    }

    /// Removes a record from the live table without emitting a transition.
    ///
    /// Any override on the device stays in place.
    pub fn prune(&self, id: &DeviceId) -> Option<DeviceRecord> {
        lock(&self.shared.state).table.remove(id)
    }

    /// Copies of every record, in ascending id order.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceRecord> {
        lock(&self.shared.state).table.values().cloned().collect()
    }

    /// Copy of a single record.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<DeviceRecord> {
        lock(&self.shared.state).table.get(id).cloned()
    }

    /// The active override for `id`, if any.
    #[must_use]
    pub fn override_for(&self, id: &DeviceId) -> Option<Override> {
        lock(&self.shared.state).tracker.get(id)
    }

    /// Commits host labels unless a non-empty set was already committed.
    pub fn set_host_labels<I, S>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared.labels.set(labels)
    }

    /// The committed host labels, possibly empty.
    #[must_use]
    pub fn host_labels(&self) -> BTreeSet<String> {
        self.shared.labels.get()
    }

    /// Registers a callback that runs on the worker thread.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> Subscription {
        let subscription_id = SubscriptionId::new();
        let _ = self.control_tx.send(ControlMsg::Register {
            subscription_id,
            subscriber: Box::new(subscriber),
        });
        Subscription {
            subscription_id,
            control_tx: self.control_tx.clone(),
            unregistered: AtomicBool::new(false),
        }
    }

    /// Registers a buffered stream of events.
    pub fn subscribe_stream(&self) -> EventStream {
        let subscription_id = SubscriptionId::new();
        let (tx, rx) = bounded::<MonitorEvent>(self.shared.cfg.stream_capacity.max(1));
        let forwarder = StreamForwarder {
            tx,
            dropped_events: Arc::clone(&self.shared.counters.dropped_events),
        };
        let _ = self.control_tx.send(ControlMsg::Register {
            subscription_id,
            subscriber: Box::new(forwarder),
        });
        EventStream::new(subscription_id, rx, self.control_tx.clone())
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let c = &self.shared.counters;
        MonitorStats {
            refreshes_completed: c.refreshes_completed.load(Ordering::Relaxed),
            refreshes_failed: c.refreshes_failed.load(Ordering::Relaxed),
            triggers_coalesced: c.triggers_coalesced.load(Ordering::Relaxed),
            subscriber_failures: c.subscriber_failures.load(Ordering::Relaxed),
            dropped_events: c.dropped_events.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting triggers, lets the worker finish any queued refresh
    /// and dispatch, then joins it.
    ///
    /// Blocks for as long as an in-flight fetch does.
    pub fn shutdown(mut self) {
        self.close_triggers();
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }

    fn close_triggers(&mut self) {
        // Swap in a dead sender; the worker exits once the real one is gone.
        let (dead_tx, _) = bounded::<()>(1);
        drop(std::mem::replace(&mut self.trigger_tx, dead_tx));
    }
}

impl Drop for FleetMonitor {
    fn drop(&mut self) {
        // Do not join: the worker may be stuck in a hung fetch, and dropping
        // the monitor must not hang with it. The worker exits on its own once
        // the trigger channel closes.
        self.close_triggers();
        drop(self.join.take());
    }
}
