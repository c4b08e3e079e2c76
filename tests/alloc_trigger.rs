use std::alloc::System;
use std::time::Duration;

use crossbeam_channel::unbounded;
use stats_alloc::{Region, StatsAlloc, INSTRUMENTED_SYSTEM};

use fleetmon::device::snapshot_from;
use fleetmon::{FleetMonitor, MonitorConfig, Snapshot, SourceError};

#[global_allocator]
static GLOBAL: &StatsAlloc<System> = &INSTRUMENTED_SYSTEM;

#[test]
fn coalesced_triggers_do_not_allocate() {
    let (started_tx, started_rx) = unbounded::<()>();
    let (release_tx, release_rx) = unbounded::<()>();
    let monitor = FleetMonitor::with_source(
        MonitorConfig::default(),
        move || -> Result<Snapshot, SourceError> {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(snapshot_from([("devA", "online")]))
        },
    );

    // Park the worker inside the source so nothing else allocates.
    monitor.trigger_refresh();
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("fetch must start");

    let region = Region::new(GLOBAL);
    for _ in 0..1_000 {
        monitor.trigger_refresh();
    }
    let stats = region.change();

    // Budget is conservative to avoid CI flakiness; a per-trigger allocation
    // would show up as >= 1000.
    assert!(
        stats.allocations <= 16,
        "coalesced triggers allocated: {stats:?}"
    );
    assert_eq!(monitor.stats().triggers_coalesced, 999);

    drop(release_tx);
    monitor.shutdown();
}
