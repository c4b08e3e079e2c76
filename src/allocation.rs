//! Local state overrides.
//!
//! Allocation is driven by local control flow, not by the device source: when
//! the embedder takes exclusive control of a device it calls `allocate`, and
//! the device stays `Allocated` across every reconciliation pass until it is
//! released. `Ignored` works the same way for devices excluded from the pool.
//!
//! The tracker does not lock anything itself. Callers hold the monitor's state
//! lock around both the tracker and the table so that an allocation and a
//! reconciliation pass never interleave.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, DeviceState, DeviceTable};
use crate::reconcile::Transition;

/// A locally forced state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    /// Held exclusively by the embedder.
    Allocated,
    /// Excluded from the pool.
    Ignored,
}

impl Override {
    /// The device state this override forces.
    #[must_use]
    pub const fn state(self) -> DeviceState {
        match self {
            Self::Allocated => DeviceState::Allocated,
            Self::Ignored => DeviceState::Ignored,
        }
    }
}

/// Records devices under a local override.
#[derive(Debug, Clone, Default)]
pub struct AllocationTracker {
    overrides: BTreeMap<DeviceId, Override>,
}

impl AllocationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` allocated and forces its record, if any, to `Allocated`.
    ///
    /// Returns the transition to dispatch, or `None` when the device was
    /// already allocated or has no record yet. An unknown device still gets
    /// the override and is created as `Allocated` on first appearance.
    pub fn allocate(
        &mut self,
        table: &mut DeviceTable,
        id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.apply(table, id, Override::Allocated, now)
    }

    /// Marks `id` ignored, with the same semantics as [`Self::allocate`].
    pub fn ignore(
        &mut self,
        table: &mut DeviceTable,
        id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.apply(table, id, Override::Ignored, now)
    }

    /// Clears any override on `id`, returning the one that was removed.
    ///
    /// The record keeps its forced state until the next reconciliation pass
    /// re-derives the natural one.
    pub fn release(&mut self, id: &DeviceId) -> Option<Override> {
        self.overrides.remove(id)
    }

    /// The active override for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &DeviceId) -> Option<Override> {
        self.overrides.get(id).copied()
    }

    /// Returns true if `id` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, id: &DeviceId) -> bool {
        self.get(id) == Some(Override::Allocated)
    }

    /// Number of devices under an override.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Returns true if no overrides are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    fn apply(
        &mut self,
        table: &mut DeviceTable,
        id: &DeviceId,
        ov: Override,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.overrides.insert(id.clone(), ov);

        let record = table.get_mut(id)?;
        let forced = ov.state();
        if record.state == forced {
            return None;
        }

        let previous = record.state;
        record.state = forced;
        record.last_updated = now;
        Some(Transition {
            device: id.clone(),
            previous: Some(previous),
            current: forced,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceRecord;

    fn table_with(id: &str, state: DeviceState) -> DeviceTable {
        let mut table = DeviceTable::new();
        let id = DeviceId::new(id);
        table.insert(id.clone(), DeviceRecord::new(id, state, Utc::now()));
        table
    }

    #[test]
    fn test_allocate_known_device_emits_transition() {
        let mut table = table_with("devA", DeviceState::Available);
        let mut tracker = AllocationTracker::new();
        let id = DeviceId::new("devA");

        let t = tracker.allocate(&mut table, &id, Utc::now()).unwrap();
        assert_eq!(t.previous, Some(DeviceState::Available));
        assert_eq!(t.current, DeviceState::Allocated);
        assert_eq!(table[&id].state, DeviceState::Allocated);
        assert!(tracker.is_allocated(&id));
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut table = table_with("devA", DeviceState::Available);
        let mut tracker = AllocationTracker::new();
        let id = DeviceId::new("devA");

        assert!(tracker.allocate(&mut table, &id, Utc::now()).is_some());
        assert!(tracker.allocate(&mut table, &id, Utc::now()).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_allocate_unknown_device_records_override_only() {
        let mut table = DeviceTable::new();
        let mut tracker = AllocationTracker::new();
        let id = DeviceId::new("ghost");

        assert!(tracker.allocate(&mut table, &id, Utc::now()).is_none());
        assert!(table.is_empty());
        assert_eq!(tracker.get(&id), Some(Override::Allocated));
    }

    #[test]
    fn test_ignore_replaces_allocation() {
        let mut table = table_with("devA", DeviceState::Available);
        let mut tracker = AllocationTracker::new();
        let id = DeviceId::new("devA");

        tracker.allocate(&mut table, &id, Utc::now());
        let t = tracker.ignore(&mut table, &id, Utc::now()).unwrap();
        assert_eq!(t.previous, Some(DeviceState::Allocated));
        assert_eq!(t.current, DeviceState::Ignored);
        assert!(!tracker.is_allocated(&id));
    }

    #[test]
    fn test_release_keeps_record_state_until_next_pass() {
        let mut table = table_with("devA", DeviceState::Available);
        let mut tracker = AllocationTracker::new();
        let id = DeviceId::new("devA");

        tracker.allocate(&mut table, &id, Utc::now());
        assert_eq!(tracker.release(&id), Some(Override::Allocated));
        assert_eq!(tracker.release(&id), None);
        assert!(tracker.is_empty());
        assert_eq!(table[&id].state, DeviceState::Allocated);
    }
}
