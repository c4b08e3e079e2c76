//! Refresh and dispatch worker.
//!
//! This module owns the background thread that fetches snapshots, reconciles
//! them into the live table, and dispatches the resulting events to
//! subscribers. Callers talk to it over three channels:
//!
//! - `trigger`: capacity one. A trigger sent while the slot is occupied is
//!   coalesced, which bounds work to one fetch in flight plus one pending.
//! - `control`: subscriber registration and removal.
//! - `outbox`: events derived under the state lock, in derivation order.
//!   Allocation changes made on caller threads reach subscribers this way.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use crossbeam_channel::{select, Receiver, Sender};

use crate::allocation::AllocationTracker;
use crate::device::DeviceTable;
use crate::error::panic_message;
use crate::labels::HostLabels;
use crate::reconcile::{reconcile, Transition};
use crate::source::{Fetcher, SnapshotSource};

use super::config::MonitorConfig;
use super::events::{EventPayload, MonitorEvent, SubscriptionId};
use super::subscriber::Subscriber;

pub(crate) enum ControlMsg {
    Register {
        subscription_id: SubscriptionId,
        subscriber: Box<dyn Subscriber>,
    },
    Unregister {
        subscription_id: SubscriptionId,
    },
}

/// The live table and the overrides that constrain it. Always mutated as a
/// unit under `Shared::state`.
#[derive(Debug, Default)]
pub(crate) struct FleetState {
    pub(crate) table: DeviceTable,
    pub(crate) tracker: AllocationTracker,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) refreshes_completed: AtomicU64,
    pub(crate) refreshes_failed: AtomicU64,
    pub(crate) triggers_coalesced: AtomicU64,
    pub(crate) subscriber_failures: AtomicU64,
    pub(crate) dropped_events: Arc<AtomicU64>,
}

/// State shared between the caller-facing handle and the worker.
pub(crate) struct Shared {
    pub(crate) cfg: MonitorConfig,
    pub(crate) state: Mutex<FleetState>,
    pub(crate) source: Mutex<Option<Arc<dyn SnapshotSource>>>,
    pub(crate) labels: HostLabels,
    pub(crate) outbox: Sender<MonitorEvent>,
    pub(crate) counters: Counters,
}

/// Locks `m`, recovering the guard if a previous holder panicked.
///
/// Nothing that runs under these locks leaves the data half-updated, so a
/// poisoned guard is still consistent.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(cfg: MonitorConfig, outbox: Sender<MonitorEvent>) -> Self {
        Self {
            cfg,
            state: Mutex::new(FleetState::default()),
            source: Mutex::new(None),
            labels: HostLabels::new(),
            outbox,
            counters: Counters::default(),
        }
    }

    /// Queues a transition for dispatch. Call with the state lock held so the
    /// outbox order matches derivation order.
    pub(crate) fn enqueue_transition(&self, transition: Transition) {
        self.enqueue(EventPayload::Transition(transition));
    }

    fn enqueue(&self, payload: EventPayload) {
        // The worker holds the receiver for as long as `Shared` lives.
        let _ = self.outbox.send(MonitorEvent::new(payload, self.labels.to_vec()));
    }

    /// One fetch + reconcile pass. Events land in the outbox.
    fn refresh(&self, fetcher: &mut Fetcher) {
        let Some(source) = lock(&self.source).clone() else {
            tracing::debug!("No device source configured, skipping refresh");
            return;
        };

        let snapshot = match fetcher.fetch(&source) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Device refresh failed, keeping previous state");
                self.counters.refreshes_failed.fetch_add(1, Ordering::Relaxed);
                self.enqueue(EventPayload::RefreshFailed { error: e.to_string() });
                return;
            }
        };

        let mut state = lock(&self.state);
        let out = reconcile(&state.table, &snapshot, &state.tracker, Utc::now());
        state.table = out.table;

        let transitions = out.transitions.len();
        for t in out.transitions {
            self.enqueue_transition(t);
        }
        if self.cfg.emit_full_state {
            let devices = state.table.values().cloned().collect();
            self.enqueue(EventPayload::FullState { devices });
        }
        let devices = state.table.len();
        drop(state);

        self.counters.refreshes_completed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            devices,
            transitions,
            unrecognized = out.unrecognized.len(),
            "Device refresh completed"
        );
    }
}

struct Registry {
    subs: HashMap<SubscriptionId, Box<dyn Subscriber>>,
}

impl Registry {
    fn apply(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Register {
                subscription_id,
                subscriber,
            } => {
                self.subs.insert(subscription_id, subscriber);
            }
            ControlMsg::Unregister { subscription_id } => {
                self.subs.remove(&subscription_id);
            }
        }
    }

    fn dispatch(&mut self, event: &MonitorEvent, counters: &Counters) {
        for (id, sub) in &mut self.subs {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sub.on_event(event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.message,
                Err(payload) => panic_message(payload.as_ref()),
            };
            counters.subscriber_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(subscription = ?id, error = %failure, "Subscriber failed to handle event");
        }
    }
}

/// Applies pending registrations, then delivers everything in the outbox.
///
/// Control messages are re-checked before each event so a subscriber added
/// or removed mid-drain takes effect at the next event boundary.
fn drain(
    registry: &mut Registry,
    shared: &Shared,
    control_rx: &Receiver<ControlMsg>,
    outbox_rx: &Receiver<MonitorEvent>,
) {
    loop {
        while let Ok(msg) = control_rx.try_recv() {
            registry.apply(msg);
        }
        let Ok(event) = outbox_rx.try_recv() else {
            break;
        };
        registry.dispatch(&event, &shared.counters);
    }
}

pub(crate) fn worker_loop(
    shared: Arc<Shared>,
    trigger_rx: Receiver<()>,
    control_rx: Receiver<ControlMsg>,
    outbox_rx: Receiver<MonitorEvent>,
) {
    let mut registry = Registry {
        subs: HashMap::new(),
    };
    let mut fetcher = Fetcher::new(shared.cfg.fetch_timeout());

    loop {
        select! {
            recv(trigger_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                shared.refresh(&mut fetcher);
            }
            recv(control_rx) -> msg => {
                if let Ok(msg) = msg {
                    registry.apply(msg);
                }
            }
            recv(outbox_rx) -> msg => {
                if let Ok(event) = msg {
                    while let Ok(ctl) = control_rx.try_recv() {
                        registry.apply(ctl);
                    }
                    registry.dispatch(&event, &shared.counters);
                }
            }
        }

        drain(&mut registry, &shared, &control_rx, &outbox_rx);
    }

    // Deliver whatever the final passes produced.
    drain(&mut registry, &shared, &control_rx, &outbox_rx);
    tracing::debug!("Fleet monitor worker stopped");
}
