//! Monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetResult, SetupError};

/// Tuning knobs for a `FleetMonitor`.
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```
/// use fleetmon::MonitorConfig;
///
/// let cfg = MonitorConfig::from_json_str(r#"{ "fetch_timeout_ms": 30000 }"#).unwrap();
/// assert_eq!(cfg.fetch_timeout().unwrap().as_secs(), 30);
/// assert!(cfg.emit_full_state);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upper bound on one device listing. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
    /// Buffered events per `EventStream` before new events are dropped.
    pub stream_capacity: usize,
    /// Dispatch a `FullState` event after every successful pass.
    pub emit_full_state: bool,
    /// Schedule a refresh whenever an override is released.
    pub refresh_on_release: bool,
    /// Name of the background worker thread.
    pub worker_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: None,
            stream_capacity: 1024,
            emit_full_state: true,
            refresh_on_release: true,
            worker_name: "fleetmon-refresh".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> FleetResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            SetupError::InvalidConfig {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// The fetch timeout as a `Duration`.
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Builder-style setter for the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}
