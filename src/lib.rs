//! # fleetmon - Device Fleet Availability Monitor
//!
//! fleetmon tracks the live state of a set of attached or remote devices,
//! refreshes it from a pluggable enumeration source, and notifies subscribers
//! of every state transition. Device enumeration often goes through external
//! tooling that can hang, so it always runs on the monitor's own worker
//! thread; callers never block on it.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: one full listing of device id to raw status from the source
//! - **Reconciliation pass**: diffing a snapshot against the live table
//! - **Override**: a locally forced `Allocated` or `Ignored` state that
//!   snapshots cannot change until it is released
//! - **Coalescing**: redundant refresh triggers fold into one pending refresh
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetmon::{FleetMonitor, MonitorConfig};
//!
//! let monitor = FleetMonitor::with_source(MonitorConfig::default(), adb_lister);
//! monitor.set_host_labels(["lab-3", "rack-7"]);
//!
//! let _sub = monitor.subscribe(|event: &fleetmon::MonitorEvent| {
//!     scheduler.publish(event);
//!     Ok(())
//! });
//!
//! monitor.trigger_refresh();
//! monitor.allocate("emulator-5554");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod allocation;
pub mod artifacts;
pub mod device;
pub mod error;
pub mod labels;
pub mod monitor;
pub mod reconcile;
pub mod source;

// Re-export primary types at crate root for convenience
pub use allocation::{AllocationTracker, Override};
pub use artifacts::{
    CaseOutcome, CaseResult, InvocationListener, LibraryTestRunner, RunSummary, SuiteExecutor,
};
pub use device::{classify_status, DeviceId, DeviceRecord, DeviceState, DeviceTable, Snapshot};
pub use error::{ExecutionError, FleetError, FleetResult, SetupError, SourceError, SubscriberError};
pub use labels::HostLabels;
pub use monitor::{
    EventPayload, EventStream, FleetMonitor, MonitorConfig, MonitorEvent, MonitorStats, Subscriber,
    Subscription, SubscriptionId,
};
pub use reconcile::{reconcile, Reconciliation, Transition};
pub use source::SnapshotSource;
