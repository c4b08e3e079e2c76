//! Background refresh, reconciliation, and event dispatch.
//!
//! `FleetMonitor` is the embedder's handle. It owns one worker thread that
//! runs the device source, reconciles each snapshot into the live table, and
//! delivers the resulting events to subscribers. Callers only ever enqueue
//! work or take short locks; they never wait on the device source.

/// Monitor configuration.
pub mod config;
mod dispatcher;
/// Event and subscription id types.
pub mod events;
/// Caller-facing handle.
pub mod fleet;
/// Buffered subscriber stream.
pub mod stream;
/// Subscriber callback trait.
pub mod subscriber;

pub use config::MonitorConfig;
pub use events::{EventPayload, MonitorEvent, SubscriptionId};
pub use fleet::{FleetMonitor, MonitorStats, Subscription};
pub use stream::EventStream;
pub use subscriber::Subscriber;
