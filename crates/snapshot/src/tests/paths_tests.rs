use crate::*;
use std::path::{Path, PathBuf};

#[test]
fn layout_follows_root_worker_attempt() {
    let paths = SnapshotPaths::new("/out", WorkerAttemptId::new(3, 2));

    assert_eq!(paths.worker_dir(), Path::new("/out/snapshots/3"));
    assert_eq!(paths.base_dir(), PathBuf::from("/out/snapshots/3/2"));
    assert_eq!(paths.temp_dir(), PathBuf::from("/out/snapshots/3/2/_temporary"));
    assert_eq!(
        paths.temp_file(),
        PathBuf::from("/out/snapshots/3/2/_temporary/snapshots_")
    );
    assert_eq!(
        paths.snapshot_file(0),
        PathBuf::from("/out/snapshots/3/2/snapshots_0")
    );
    assert_eq!(
        paths.snapshot_file(17),
        PathBuf::from("/out/snapshots/3/2/snapshots_17")
    );
}

#[test]
fn sibling_attempts_differ_only_in_last_segment() {
    let a = SnapshotPaths::new("/out", WorkerAttemptId::new(1, 4));
    let b = SnapshotPaths::new("/out", WorkerAttemptId::new(1, 5));

    assert_ne!(a.base_dir(), b.base_dir());
    assert_eq!(a.worker_dir(), b.worker_dir());
    assert_eq!(b.attempt_dir(4), a.base_dir());
}

#[test]
fn workers_do_not_share_directories() {
    let a = SnapshotPaths::new("/out", WorkerAttemptId::new(0, 1));
    let b = SnapshotPaths::new("/out", WorkerAttemptId::new(1, 1));
    assert_ne!(a.base_dir(), b.base_dir());
}

#[test]
fn file_names() {
    assert_eq!(snapshot_file_name(0), "snapshots_0");
    assert_eq!(snapshot_file_name(10), "snapshots_10");
    assert_eq!(TEMP_FILE_NAME, "snapshots_");
}

#[test]
fn attempt_display() {
    assert_eq!(WorkerAttemptId::new(2, 7).to_string(), "worker_2_attempt_7");
}
