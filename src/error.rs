//! Error types for fleetmon.
//!
//! All errors are strongly typed using thiserror so callers can pattern match
//! on specific conditions. Note that most failures inside the monitor never
//! reach the caller: source and subscriber failures are reported as events,
//! and only setup-time preconditions surface synchronously.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures produced while fetching a snapshot from the device source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Device source failed: {message}")]
    Failed {
        message: String,
    },

    #[error("Device source timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Previous device source call still running after {duration_ms}ms")]
    StillRunning {
        duration_ms: u64,
    },

    #[error("Device source panicked: {message}")]
    Panicked {
        message: String,
    },
}

impl SourceError {
    /// Creates a generic source failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// A subscriber rejected or failed to process an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Subscriber failed: {message}")]
pub struct SubscriberError {
    pub message: String,
}

impl SubscriberError {
    /// Creates a subscriber error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Setup-time precondition failures. These are the only errors reported
/// synchronously to callers.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Required artifact directory is missing: {}", path.display())]
    MissingArtifactDirectory {
        path: PathBuf,
    },

    #[error("Failed to list directory {}: {source}", path.display())]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid monitor configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Runtime errors on worker channels and in the artifact test runner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Test suite in {archive} could not run: {message}")]
    SuiteFailed {
        archive: String,
        message: String,
    },
}

/// Top-level error type for fleetmon.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

}

impl FleetError {
    /// Returns true if this is a source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if this is a setup error.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the next refresh may succeed where this one failed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Source(_) => true,
            Self::Execution(e) => matches!(e, ExecutionError::Timeout { .. }),
            Self::Subscriber(_) | Self::Setup(_) => false,
        }
    }
}

/// Result type alias for fleetmon operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
