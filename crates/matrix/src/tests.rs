use super::*;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

fn sample() -> PartitionManager {
    let pm = PartitionManager::new();
    pm.create_matrix(1);
    pm.increment(1, 0, 1.5);
    pm.increment(1, 7, -2.0);
    pm.set_clock(1, 0, 4);
    pm.set_clock(1, 1, 6);
    pm.create_matrix(9);
    pm.increment(9, 42, 10.0);
    pm
}

fn image(pm: &PartitionManager) -> Vec<u8> {
    let mut buf = Vec::new();
    pm.write_matrix(&mut buf).unwrap();
    buf
}

// -------------------- Basic state --------------------

#[test]
fn create_matrix_is_idempotent() {
    let pm = PartitionManager::new();
    assert!(pm.is_empty());
    assert!(pm.create_matrix(3));
    assert!(!pm.create_matrix(3));
    assert_eq!(pm.len(), 1);
    assert_eq!(pm.matrix_ids(), vec![3]);
}

#[test]
fn increment_accumulates() {
    let pm = PartitionManager::new();
    assert_eq!(pm.increment(1, 5, 2.0), 2.0);
    assert_eq!(pm.increment(1, 5, 0.5), 2.5);
    assert_eq!(pm.get(1, 5), Some(2.5));
    assert_eq!(pm.get(1, 6), None);
    assert_eq!(pm.get(2, 5), None);
}

#[test]
fn set_clock_overwrites_and_ignores_unknown_matrix() {
    let pm = PartitionManager::new();
    pm.create_matrix(1);

    assert!(pm.set_clock(1, 2, 10));
    assert!(pm.set_clock(1, 2, 3));
    assert_eq!(pm.clock(1, 2), Some(3));

    assert!(!pm.set_clock(99, 0, 1));
    assert_eq!(pm.clock(99, 0), None);
    assert_eq!(pm.len(), 1);
}

#[test]
fn min_clock_tracks_slowest_task() {
    let pm = sample();
    assert_eq!(pm.min_clock(1), Some(4));
    assert_eq!(pm.min_clock(9), Some(0));
    assert_eq!(pm.min_clock(5), None);
}

#[test]
fn clocks_are_listed_in_order() {
    let pm = sample();
    assert_eq!(pm.clocks(), vec![(1, 0, 4), (1, 1, 6)]);
}

// -------------------- Snapshot image --------------------

#[test]
fn image_restores_identical_state() {
    let pm = sample();
    let bytes = image(&pm);

    let restored = PartitionManager::new();
    restored.parse_matrices_from_input(&mut Cursor::new(bytes)).unwrap();

    assert_eq!(restored.matrix_ids(), vec![1, 9]);
    assert_eq!(restored.partition(1), pm.partition(1));
    assert_eq!(restored.partition(9), pm.partition(9));
}

#[test]
fn loading_replaces_existing_state() {
    let bytes = image(&sample());

    let pm = PartitionManager::new();
    pm.increment(100, 1, 1.0);
    pm.parse_matrices_from_input(&mut Cursor::new(bytes)).unwrap();

    assert_eq!(pm.get(100, 1), None);
    assert_eq!(pm.get(9, 42), Some(10.0));
}

#[test]
fn empty_manager_produces_loadable_image() {
    let bytes = image(&PartitionManager::new());
    assert_eq!(bytes.len(), 8);

    let pm = sample();
    pm.parse_matrices_from_input(&mut Cursor::new(bytes)).unwrap();
    assert!(pm.is_empty());
}

#[test]
fn corrupt_image_leaves_state_untouched() {
    let mut bytes = image(&sample());
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let pm = PartitionManager::new();
    pm.increment(5, 5, 5.0);
    let err = pm
        .parse_matrices_from_input(&mut Cursor::new(bytes))
        .unwrap_err();

    assert!(matches!(err, MatrixError::Corrupt(_)));
    assert_eq!(pm.get(5, 5), Some(5.0));
}

#[test]
fn bad_magic_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.write_u32::<LittleEndian>(0xDEAD_BEEF).unwrap();
    bytes.write_u32::<LittleEndian>(0).unwrap();

    let err = PartitionManager::new()
        .parse_matrices_from_input(&mut Cursor::new(bytes))
        .unwrap_err();
    assert!(err.to_string().contains("bad magic"));
}

#[test]
fn truncated_image_is_corrupt() {
    let bytes = image(&sample());
    for cut in [0, 3, 8, 12, bytes.len() - 1] {
        let err = PartitionManager::new()
            .parse_matrices_from_input(&mut Cursor::new(bytes[..cut].to_vec()))
            .unwrap_err();
        assert!(matches!(err, MatrixError::Corrupt(_)), "cut at {}", cut);
    }
}

#[test]
fn trailing_bytes_are_corrupt() {
    let mut bytes = image(&sample());
    bytes.push(0);
    let err = PartitionManager::new()
        .parse_matrices_from_input(&mut Cursor::new(bytes))
        .unwrap_err();
    assert!(err.to_string().contains("trailing"));
}

#[test]
fn magic_spells_psm1() {
    let bytes = image(&PartitionManager::new());
    assert_eq!(&bytes[..4], b"PSM1");
}

// -------------------- Concurrency --------------------

#[test]
fn writes_during_serialization_produce_consistent_images() {
    let pm = Arc::new(PartitionManager::new());
    pm.create_matrix(1);

    let writer = {
        let pm = Arc::clone(&pm);
        thread::spawn(move || {
            for i in 0..2_000u64 {
                pm.increment(1, i % 50, 1.0);
            }
        })
    };

    for _ in 0..50 {
        let bytes = image(&pm);
        let copy = PartitionManager::new();
        copy.parse_matrices_from_input(&mut Cursor::new(bytes)).unwrap();
    }

    writer.join().unwrap();
    let total: f64 = pm.partition(1).unwrap().rows.values().sum();
    assert_eq!(total, 2_000.0);
}
