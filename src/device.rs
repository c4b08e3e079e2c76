//! Device identity, state, and record types.
//!
//! A `DeviceId` is the join key between successive snapshots. It is opaque to
//! the monitor: a serial number, a transport address, or anything else the
//! device source considers stable.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable, comparable device identifier.
///
/// Ordering is lexicographic on the underlying string, which is the order in
/// which transitions are emitted.
///
/// # Examples
///
/// ```
/// use fleetmon::DeviceId;
///
/// let a = DeviceId::new("emulator-5554");
/// let b = DeviceId::new("emulator-5556");
/// assert!(a < b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Availability state of a known device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Present in the latest snapshot and reporting a healthy status.
    Available,
    /// Previously seen, absent from the latest snapshot.
    Unavailable,
    /// Present but reporting a bad or unrecognized status.
    Unresponsive,
    /// Exclusively held by local control flow.
    Allocated,
    /// Locally excluded from the pool.
    Ignored,
}

impl DeviceState {
    /// Returns true for states driven by local overrides rather than snapshots.
    #[must_use]
    pub const fn is_override(self) -> bool {
        matches!(self, Self::Allocated | Self::Ignored)
    }

    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Unresponsive => "unresponsive",
            Self::Allocated => "allocated",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device's entry in the live state table.
///
/// Subscribers and callers only ever receive clones of these.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub state: DeviceState,
    /// Raw status string from the most recent snapshot that listed the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_raw_status: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl DeviceRecord {
    /// Creates a record in the given state with no observed status yet.
    #[must_use]
    pub fn new(id: DeviceId, state: DeviceState, at: DateTime<Utc>) -> Self {
        Self {
            id,
            state,
            last_raw_status: None,
            last_updated: at,
        }
    }
}

/// One full poll result: device identity to raw status string.
pub type Snapshot = BTreeMap<DeviceId, String>;

/// The live device-state table, keyed and iterated in identity order.
pub type DeviceTable = BTreeMap<DeviceId, DeviceRecord>;

/// Outcome of mapping a raw status string onto a natural device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClass {
    /// Natural state for the status.
    pub state: DeviceState,
    /// False when the status was not one of the known strings.
    pub recognized: bool,
}

/// Maps a raw status string from the device source onto a natural state.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Unknown
/// statuses are never rejected; they classify as `Unresponsive`.
#[must_use]
pub fn classify_status(raw: &str) -> StatusClass {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "online" | "device" | "available" | "ready" => StatusClass {
            state: DeviceState::Available,
            recognized: true,
        },
        "offline" | "unauthorized" | "recovery" | "bootloader" | "sideload" | "no permissions" => {
            StatusClass {
                state: DeviceState::Unresponsive,
                recognized: true,
            }
        }
        _ => StatusClass {
            state: DeviceState::Unresponsive,
            recognized: false,
        },
    }
}

/// Convenience for building snapshots in tests and embedders.
///
/// ```
/// use fleetmon::device::snapshot_from;
///
/// let snap = snapshot_from([("devA", "online"), ("devB", "offline")]);
/// assert_eq!(snap.len(), 2);
/// ```
pub fn snapshot_from<I, K, V>(entries: I) -> Snapshot
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<DeviceId>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_ordering_is_lexicographic() {
        let mut ids = vec![DeviceId::new("d3"), DeviceId::new("d1"), DeviceId::new("d2")];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(DeviceId::as_str).collect();
        assert_eq!(names, vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn test_classify_known_statuses() {
        assert_eq!(classify_status("online").state, DeviceState::Available);
        assert_eq!(classify_status(" Device ").state, DeviceState::Available);
        let offline = classify_status("offline");
        assert_eq!(offline.state, DeviceState::Unresponsive);
        assert!(offline.recognized);
    }

    #[test]
    fn test_classify_unknown_status_is_unresponsive() {
        let class = classify_status("charging?");
        assert_eq!(class.state, DeviceState::Unresponsive);
        assert!(!class.recognized);

        let empty = classify_status("");
        assert_eq!(empty.state, DeviceState::Unresponsive);
        assert!(!empty.recognized);
    }

    #[test]
    fn test_override_states() {
        assert!(DeviceState::Allocated.is_override());
        assert!(DeviceState::Ignored.is_override());
        assert!(!DeviceState::Available.is_override());
        assert!(!DeviceState::Unavailable.is_override());
    }

    #[test]
    fn test_device_record_serializes_without_missing_status() {
        let rec = DeviceRecord::new(DeviceId::new("x"), DeviceState::Allocated, Utc::now());
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["id"], "x");
        assert_eq!(json["state"], "allocated");
        assert!(json.get("last_raw_status").is_none());
    }
}
