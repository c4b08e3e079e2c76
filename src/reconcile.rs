//! Snapshot reconciliation.
//!
//! `reconcile` diffs a fresh snapshot against the live table and produces the
//! next table plus the list of state transitions. It is a pure function: the
//! worker calls it with the state lock held and swaps the result in.
//!
//! Rules, per device (union of previous table and snapshot, ascending id):
//! - an active override forces its state, whatever the snapshot says;
//! - listed devices classify from their raw status;
//! - previously known devices missing from the snapshot become `Unavailable`;
//! - a transition is emitted iff the state differs from the previous one.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationTracker;
use crate::device::{classify_status, DeviceId, DeviceRecord, DeviceState, DeviceTable, Snapshot};

/// A single device state change.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub device: DeviceId,
    /// `None` when the device had no record before this pass.
    pub previous: Option<DeviceState>,
    pub current: DeviceState,
    pub timestamp: DateTime<Utc>,
}

impl Transition {
    /// Returns true if the device was first seen by this transition.
    #[must_use]
    pub const fn is_new_device(&self) -> bool {
        self.previous.is_none()
    }
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// The next live table.
    pub table: DeviceTable,
    /// Transitions in ascending device id order.
    pub transitions: Vec<Transition>,
    /// Devices whose raw status was not recognized.
    pub unrecognized: Vec<DeviceId>,
}

/// Diffs `snapshot` against `previous`, honoring `overrides`.
#[must_use]
pub fn reconcile(
    previous: &DeviceTable,
    snapshot: &Snapshot,
    overrides: &AllocationTracker,
    now: DateTime<Utc>,
) -> Reconciliation {
    let ids: BTreeSet<&DeviceId> = previous.keys().chain(snapshot.keys()).collect();

    let mut out = Reconciliation {
        table: DeviceTable::new(),
        transitions: Vec::new(),
        unrecognized: Vec::new(),
    };

    for id in ids {
        let prior = previous.get(id);
        let raw = snapshot.get(id);

        let natural = match raw {
            Some(raw) => {
                let class = classify_status(raw);
                if !class.recognized {
                    tracing::debug!(device = %id, raw = %raw, "Unrecognized device status, treating as unresponsive");
                    out.unrecognized.push(id.clone());
                }
                class.state
            }
            None => DeviceState::Unavailable,
        };
        let state = overrides.get(id).map_or(natural, |ov| ov.state());

        let mut record = prior
            .cloned()
            .unwrap_or_else(|| DeviceRecord::new(id.clone(), state, now));

        if let Some(raw) = raw {
            if record.last_raw_status.as_deref() != Some(raw.as_str()) {
                record.last_raw_status = Some(raw.clone());
                record.last_updated = now;
            }
        }

        let previous_state = prior.map(|r| r.state);
        if previous_state != Some(state) {
            record.state = state;
            record.last_updated = now;
            out.transitions.push(Transition {
                device: id.clone(),
                previous: previous_state,
                current: state,
                timestamp: now,
            });
        }

        out.table.insert(id.clone(), record);
    }

    out
}
