//! Pluggable device enumeration.
//!
//! The monitor never talks to devices. The embedder supplies a
//! `SnapshotSource` that lists every known device with its raw status, and
//! the monitor calls it from its own worker thread. Listing devices often goes
//! through external tooling that can hang or call back into code holding
//! locks, so it must never run on a caller's thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::device::Snapshot;
use crate::error::{panic_message, SourceError};

/// Returns the full current mapping of device id to raw status.
///
/// Implementations may block. Closures of the right shape implement this
/// trait directly:
///
/// ```
/// use fleetmon::device::snapshot_from;
/// use fleetmon::{SnapshotSource, SourceError};
///
/// let source = || -> Result<_, SourceError> { Ok(snapshot_from([("devA", "online")])) };
/// assert_eq!(source.list_devices().unwrap().len(), 1);
/// ```
pub trait SnapshotSource: Send + Sync {
    /// Lists every device the source currently knows about.
    fn list_devices(&self) -> Result<Snapshot, SourceError>;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> Result<Snapshot, SourceError> + Send + Sync,
{
    fn list_devices(&self) -> Result<Snapshot, SourceError> {
        self()
    }
}

/// Runs the device source for the worker, converting panics and overruns
/// into `SourceError`.
///
/// With a timeout, each call runs on a helper thread and is abandoned if it
/// does not return in time. An abandoned call is remembered: no new call
/// starts until it returns, so at most one source call is ever running.
pub(crate) struct Fetcher {
    timeout: Option<Duration>,
    abandoned: Option<Receiver<Result<Snapshot, SourceError>>>,
}

impl Fetcher {
    pub(crate) const fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            abandoned: None,
        }
    }

    pub(crate) fn fetch(
        &mut self,
        source: &Arc<dyn SnapshotSource>,
    ) -> Result<Snapshot, SourceError> {
        let Some(timeout) = self.timeout else {
            return call_isolated(source.as_ref());
        };

        if let Some(prev) = self.abandoned.take() {
            // Give the abandoned call one more timeout to return; its result is
            // stale and discarded either way.
            if let Err(RecvTimeoutError::Timeout) = prev.recv_timeout(timeout) {
                self.abandoned = Some(prev);
                return Err(SourceError::StillRunning {
                    duration_ms: millis(timeout),
                });
            }
        }

        let (tx, rx) = bounded::<Result<Snapshot, SourceError>>(1);
        let source = Arc::clone(source);
        thread::Builder::new()
            .name("fleetmon-fetch".to_string())
            .spawn(move || {
                // Receiver is gone once the worker has stopped.
                let _ = tx.send(call_isolated(source.as_ref()));
            })
            .map_err(|e| SourceError::failed(format!("failed to spawn fetch thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.abandoned = Some(rx);
                Err(SourceError::Timeout {
                    duration_ms: millis(timeout),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Panicked {
                message: "fetch thread exited without a result".to_string(),
            }),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn call_isolated(source: &dyn SnapshotSource) -> Result<Snapshot, SourceError> {
    panic::catch_unwind(AssertUnwindSafe(|| source.list_devices())).unwrap_or_else(|payload| {
        Err(SourceError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::device::snapshot_from;

    fn arc<F>(f: F) -> Arc<dyn SnapshotSource>
    where
        F: Fn() -> Result<Snapshot, SourceError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_fetch_without_timeout_returns_snapshot() {
        let source = arc(|| Ok(snapshot_from([("a", "online")])));
        let snap = Fetcher::new(None).fetch(&source).unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_fetch_propagates_source_error() {
        let source = arc(|| Err(SourceError::failed("adb server not running")));
        let err = Fetcher::new(None).fetch(&source).unwrap_err();
        assert_eq!(err, SourceError::failed("adb server not running"));
    }

    #[test]
    fn test_fetch_converts_panic() {
        let source = arc(|| panic!("lister exploded"));
        let err = Fetcher::new(None).fetch(&source).unwrap_err();
        let SourceError::Panicked { message } = err else {
            panic!("expected Panicked, got {err:?}");
        };
        assert!(message.contains("lister exploded"));
    }

    #[test]
    fn test_fetch_times_out_on_slow_source() {
        let source = arc(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(Snapshot::new())
        });
        let err = Fetcher::new(Some(Duration::from_millis(20)))
            .fetch(&source)
            .unwrap_err();
        assert_eq!(err, SourceError::Timeout { duration_ms: 20 });
    }

    #[test]
    fn test_fetch_with_timeout_returns_fast_result() {
        let source = arc(|| Ok(snapshot_from([("a", "offline")])));
        let snap = Fetcher::new(Some(Duration::from_secs(5)))
            .fetch(&source)
            .unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_abandoned_call_blocks_new_calls_until_it_returns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = bounded::<()>(1);
        let counter = Arc::clone(&calls);
        let source = arc(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = release_rx.recv();
            }
            Ok(snapshot_from([("a", "online")]))
        });
        let mut fetcher = Fetcher::new(Some(Duration::from_millis(20)));

        assert_eq!(
            fetcher.fetch(&source).unwrap_err(),
            SourceError::Timeout { duration_ms: 20 }
        );
        for _ in 0..3 {
            assert_eq!(
                fetcher.fetch(&source).unwrap_err(),
                SourceError::StillRunning { duration_ms: 20 }
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        let snap = loop {
            match fetcher.fetch(&source) {
                Ok(snap) => break snap,
                Err(SourceError::StillRunning { .. }) => {}
                Err(e) => panic!("unexpected fetch error: {e}"),
            }
        };
        assert_eq!(snap.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
