//! Crash and Recovery Tests
//!
//! Simulates crashes during snapshot rotation and verifies that reopening the
//! store plus replaying the transaction log restores every counter:
//!
//! - Power loss at each write point leaves the previous snapshot published
//! - I/O errors during rotation keep the store usable
//! - A corrupted newest snapshot is quarantined and the older one is used
//! - With every snapshot quarantined, open refuses until a builder is given
//! - A store with no snapshot is rebuilt from a `CountsBuilder`
//! - Reopen after clean rotations keeps all data

use std::fs;
use std::sync::Once;

use countsdb_durability::testing::{corrupt_byte, overwrite_entry_count};
use countsdb_durability::{list_quarantined, list_snapshots, SNAPSHOT_HEADER_SIZE};
use countsdb_engine::{
    CountsBuilder, CountsConfig, CountsDeltaBatch, CountsKey, CountsStore, CounterPair, CrashPoint,
    FileVersion, RecoveryStats, RotationState, Updater, WriteFault,
};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

/// Route store logs to the test output (visible with --nocapture)
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

fn open(dir: &TempDir) -> CountsStore {
    init_tracing();
    CountsStore::open(CountsConfig::for_testing(dir.path())).unwrap()
}

/// A small transaction log: tx N adds one node with label N % 3 and one
/// relationship (N % 3)-[0]->(0)
fn log(range: std::ops::RangeInclusive<u64>) -> Vec<CountsDeltaBatch> {
    range
        .map(|tx| {
            let label = (tx % 3) as i32;
            CountsDeltaBatch::new(tx)
                .with(CountsKey::node(label), CounterPair::count(1))
                .with(CountsKey::relationship(label, 0, 0), CounterPair::count(1))
        })
        .collect()
}

fn expected_nodes(range: std::ops::RangeInclusive<u64>, label: i32) -> i64 {
    range.filter(|tx| (tx % 3) as i32 == label).count() as i64
}

fn assert_log_applied(store: &CountsStore, last: u64) {
    for label in 0..3 {
        let expected = expected_nodes(1..=last, label);
        assert_eq!(store.node_count(label).unwrap(), expected, "label {label}");
        assert_eq!(
            store.relationship_count(label, 0, 0).unwrap(),
            expected,
            "relationship from {label}"
        );
    }
}

// ============================================================================
// Crash during rotation
// ============================================================================

/// Test: power loss at every point of the snapshot write
/// Expected: reopen finds the previous snapshot, removes the temp file, and
/// log replay restores the lost deltas
#[test]
fn test_power_loss_during_rotation() {
    for point in CrashPoint::all() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open(&temp_dir);
            store.recover_from_log(log(1..=5));
            store.rotate(5).unwrap();
            store.recover_from_log(log(6..=10));

            store.inject_write_fault(Some(WriteFault::crash(point)));
            assert!(store.rotate(10).is_err(), "{}", point.description());
            assert_eq!(store.rotation_state(), RotationState::Aborted);
            assert_eq!(store.current_version(), FileVersion::new(5, 0));
            // Everything is still readable before the "crash"
            assert_log_applied(&store, 10);
        }

        let store = open(&temp_dir);
        assert_eq!(store.current_version(), FileVersion::new(5, 0));
        assert_eq!(store.recovery_report().removed_temp, 1, "{}", point.description());
        assert_log_applied(&store, 5);

        let stats = store.recover_from_log(log(1..=10));
        assert_eq!(stats, RecoveryStats { applied: 5, skipped: 5 });
        assert_log_applied(&store, 10);

        assert_eq!(store.rotate(10).unwrap(), FileVersion::new(10, 0));
        assert_log_applied(&store, 10);
    }
}

/// Test: I/O error during rotation, then retry without reopening
/// Expected: the retry publishes everything exactly once
#[test]
fn test_io_error_then_retry() {
    for point in CrashPoint::all() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);
        store.recover_from_log(log(1..=4));

        store.inject_write_fault(Some(WriteFault::io_error(point)));
        assert!(store.rotate(4).is_err());
        assert_eq!(store.rotation_stats().failed, 1);
        // Temp file already cleaned up, only the base snapshot remains
        assert_eq!(list_snapshots(temp_dir.path(), "counts").unwrap().len(), 1);

        store.inject_write_fault(None);
        assert_eq!(store.rotate(4).unwrap(), FileVersion::new(4, 0));
        assert_log_applied(&store, 4);
        assert_eq!(store.pending_keys(), 0);
    }
}

// ============================================================================
// Corruption
// ============================================================================

/// Test: newest snapshot corrupted while an older valid one is still on disk
/// Expected: newest quarantined, older selected, replay fills the gap
#[test]
fn test_corrupt_newest_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    let (older_path, older_bytes, newest_path) = {
        let store = open(&temp_dir);
        store.recover_from_log(log(1..=3));
        store.rotate(3).unwrap();
        let older_path = store.current_path();
        let older_bytes = fs::read(&older_path).unwrap();

        store.recover_from_log(log(4..=6));
        store.rotate(6).unwrap();
        (older_path, older_bytes, store.current_path())
    };

    // Old file was deleted after the swap; put it back as if deletion never ran
    assert!(!older_path.exists());
    fs::write(&older_path, older_bytes).unwrap();
    corrupt_byte(&newest_path, SNAPSHOT_HEADER_SIZE as u64).unwrap();

    let store = open(&temp_dir);
    let report = store.recovery_report();
    assert_eq!(report.selected, Some(FileVersion::new(3, 0)));
    assert_eq!(report.quarantined, vec![FileVersion::new(6, 0)]);
    assert!(!newest_path.exists());

    assert_log_applied(&store, 3);
    store.recover_from_log(log(1..=6));
    assert_log_applied(&store, 6);
}

/// Test: the only snapshot is corrupted and no builder is available
/// Expected: open refuses with a corruption error, also on a second attempt
/// after the file was quarantined; a builder then restores the store
#[test]
fn test_only_snapshot_corrupt_requires_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let path = {
        let store = open(&temp_dir);
        store.recover_from_log(log(1..=3));
        store.rotate(3).unwrap();
        store.current_path()
    };
    corrupt_byte(&path, 0).unwrap();

    init_tracing();
    for _ in 0..2 {
        let err = CountsStore::open(CountsConfig::for_testing(temp_dir.path())).unwrap_err();
        assert!(err.is_corruption(), "{err}");
        assert!(!path.exists());
        assert_eq!(list_quarantined(temp_dir.path(), "counts").unwrap().len(), 1);
        assert!(list_snapshots(temp_dir.path(), "counts").unwrap().is_empty());
    }

    // Host rebuilt its counts up to tx 2 and replays the rest of the log
    let scan = GraphScan {
        tx_id: 2,
        nodes: vec![(1, 1), (2, 1)],
    };
    let store =
        CountsStore::open_with_builder(CountsConfig::for_testing(temp_dir.path()), &scan).unwrap();
    assert_eq!(store.current_version(), FileVersion::new(2, 0));
    assert_eq!(store.recover_from_log(log(1..=3)), RecoveryStats { applied: 1, skipped: 2 });
    assert_eq!(store.node_count(0).unwrap(), 1);
    assert_eq!(store.node_count(1).unwrap(), 1);
    assert_eq!(store.node_count(2).unwrap(), 1);

    // A valid snapshot exists again, so a plain open works
    drop(store);
    assert_eq!(open(&temp_dir).current_version(), FileVersion::new(2, 0));
}

/// Test: header entry count flipped to a value whose file size overflows
/// Expected: file quarantined like any other corruption; the older snapshot
/// is used, and without one open asks for a rebuild
#[test]
fn test_overflowing_entry_count_quarantined() {
    let temp_dir = TempDir::new().unwrap();
    let (older_path, older_bytes, newest_path) = {
        let store = open(&temp_dir);
        store.recover_from_log(log(1..=2));
        store.rotate(2).unwrap();
        let older_path = store.current_path();
        let older_bytes = fs::read(&older_path).unwrap();

        store.recover_from_log(log(3..=5));
        store.rotate(5).unwrap();
        (older_path, older_bytes, store.current_path())
    };
    fs::write(&older_path, older_bytes).unwrap();
    overwrite_entry_count(&newest_path, 1 << 60).unwrap();

    let store = open(&temp_dir);
    assert_eq!(store.recovery_report().quarantined, vec![FileVersion::new(5, 0)]);
    assert_eq!(store.current_version(), FileVersion::new(2, 0));
    assert_log_applied(&store, 2);
    let older_path = store.current_path();
    drop(store);

    overwrite_entry_count(&older_path, u64::MAX).unwrap();
    let err = CountsStore::open(CountsConfig::for_testing(temp_dir.path())).unwrap_err();
    assert!(err.is_corruption(), "{err}");
    assert_eq!(list_quarantined(temp_dir.path(), "counts").unwrap().len(), 2);
}

// ============================================================================
// Rebuild
// ============================================================================

struct GraphScan {
    tx_id: u64,
    nodes: Vec<(i32, i64)>,
}

impl CountsBuilder for GraphScan {
    fn last_committed_tx_id(&self) -> u64 {
        self.tx_id
    }

    fn initialize(&self, updater: &mut Updater<'_>) {
        for &(label, count) in &self.nodes {
            updater.increment_node_count(label, count);
        }
    }
}

/// Test: open on an empty directory with a builder
/// Expected: initial snapshot holds the rebuilt counts at the builder's tx
#[test]
fn test_rebuild_from_builder() {
    let temp_dir = TempDir::new().unwrap();
    let scan = GraphScan {
        tx_id: 42,
        nodes: vec![(1, 10), (2, 20)],
    };
    let store =
        CountsStore::open_with_builder(CountsConfig::for_testing(temp_dir.path()), &scan).unwrap();

    assert_eq!(store.current_version(), FileVersion::new(42, 0));
    assert_eq!(store.node_count(1).unwrap(), 10);
    assert_eq!(store.node_count(2).unwrap(), 20);
    assert_eq!(store.last_closed_transaction_id(), 42);

    // Log entries up to the rebuild point are already reflected
    let stats = store.recover_from_log(vec![
        CountsDeltaBatch::new(42).with(CountsKey::node(1), CounterPair::count(1)),
        CountsDeltaBatch::new(43).with(CountsKey::node(1), CounterPair::count(1)),
    ]);
    assert_eq!(stats, RecoveryStats { applied: 1, skipped: 1 });
    assert_eq!(store.node_count(1).unwrap(), 11);
}

/// Test: builder is ignored when a valid snapshot exists
#[test]
fn test_builder_unused_with_valid_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open(&temp_dir);
        store.recover_from_log(log(1..=2));
        store.rotate(2).unwrap();
    }
    let scan = GraphScan {
        tx_id: 99,
        nodes: vec![(7, 7)],
    };
    let store =
        CountsStore::open_with_builder(CountsConfig::for_testing(temp_dir.path()), &scan).unwrap();
    assert_eq!(store.current_version(), FileVersion::new(2, 0));
    assert_eq!(store.node_count(7).unwrap(), 0);
    assert_log_applied(&store, 2);
}

// ============================================================================
// Clean reopen
// ============================================================================

/// Test: several rotations then reopen
/// Expected: one snapshot on disk, counters intact, new transactions accepted
#[test]
fn test_reopen_retains_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open(&temp_dir);
        for chunk in [1..=10u64, 11..=20, 21..=30] {
            let last = *chunk.end();
            store.recover_from_log(log(chunk));
            store.rotate(last).unwrap();
        }
        let mut stats = store.stats_updater();
        stats.increment_index_sample(1, 5, 50);
        stats.close();
        store.rotate(30).unwrap();
    }

    let store = open(&temp_dir);
    assert_eq!(store.current_version(), FileVersion::new(30, 1));
    assert_eq!(list_snapshots(temp_dir.path(), "counts").unwrap().len(), 1);
    assert_log_applied(&store, 30);
    assert_eq!(store.index_sample(1).unwrap(), CounterPair::new(5, 50));

    // Ids at or below the snapshot are stale, the next one is accepted
    assert!(!store.apply_transaction(&log(30..=30)[0]));
    assert!(store.apply_transaction(&log(31..=31)[0]));
    assert_log_applied(&store, 31);
}
