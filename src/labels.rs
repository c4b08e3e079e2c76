//! Host label registry.
//!
//! Labels describe the host running the monitor so downstream consumers can
//! group it with, or tell it apart from, other hosts. The set is fixed by the
//! first non-empty write; later writes are discarded without error.

use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Write-once set of opaque host labels.
#[derive(Debug, Default)]
pub struct HostLabels {
    committed: OnceLock<BTreeSet<String>>,
}

impl HostLabels {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits `labels` if nothing has been committed yet.
    ///
    /// An empty input never commits. Returns true if this call stored the set.
    pub fn set<I, S>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return false;
        }
        let stored = self.committed.set(labels).is_ok();
        if !stored {
            tracing::debug!("Host labels already committed, discarding update");
        }
        stored
    }

    /// The committed labels, empty if none were set.
    #[must_use]
    pub fn get(&self) -> BTreeSet<String> {
        self.committed.get().cloned().unwrap_or_default()
    }

    /// The committed labels as a sorted list, for attaching to events.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.committed
            .get()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true once a non-empty set has been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.get().is_some()
    }
}
