//! Tests for Storage
//!
//! These tests verify:
//! - Header initialization for new files and memory storage
//! - Appending and reading records
//! - Persistence of header and records across reopen
//! - Corruption detection (bad addresses, checksums, truncated headers)
//! - Lock reentrancy and scoped release
//! - Records synced before the header on commit

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use bytes::Bytes;

use arbordb::storage::{Storage, ADDR_FREE_START, ADDR_NONE, HEADER_SIZE, RECORD_HEADER_SIZE};
use arbordb::tree::BinaryTree;
use arbordb::{ArborError, Config, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.db");
    (temp_dir, path)
}

fn corrupt_byte(path: &PathBuf, offset: u64) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[0xFF]).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_memory_storage_initial_header() {
    let storage = Storage::memory().unwrap();

    assert_eq!(storage.root_addr(), ADDR_NONE);
    assert_eq!(storage.free_addr(), ADDR_FREE_START);
    assert!(storage.path().is_none());
}

#[test]
fn test_open_creates_file_with_header() {
    let (_temp, path) = setup_temp_path();

    let storage = Storage::open_path(&path).unwrap();
    assert_eq!(storage.path(), Some(path.as_path()));
    storage.close().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len() as u64, HEADER_SIZE);
    assert_eq!(&bytes[0..8], &0u64.to_le_bytes());
    assert_eq!(&bytes[8..16], &16u64.to_le_bytes());
}

#[test]
fn test_set_root_addr_persists() {
    let (_temp, path) = setup_temp_path();

    let addr = {
        let mut storage = Storage::open_path(&path).unwrap();
        let addr = storage.write_data(b"root").unwrap();
        storage.set_root_addr(addr).unwrap();
        storage.close().unwrap();
        addr
    };

    let storage = Storage::open_path(&path).unwrap();
    assert_eq!(storage.root_addr(), addr);
    assert_eq!(storage.free_addr(), ADDR_FREE_START + RECORD_HEADER_SIZE + 4);
}

#[test]
fn test_reload_sees_other_handle_writes() {
    let (_temp, path) = setup_temp_path();

    let mut first = Storage::open_path(&path).unwrap();
    let mut second = Storage::open_path(&path).unwrap();

    let addr = first.write_data(b"shared").unwrap();
    first.set_root_addr(addr).unwrap();

    assert_eq!(second.root_addr(), ADDR_NONE);
    second.reload().unwrap();
    assert_eq!(second.root_addr(), addr);
    assert_eq!(&second.read_data(addr).unwrap()[..], b"shared");
}

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_write_read_data() {
    let mut storage = Storage::memory().unwrap();

    let addr = storage.write_data(b"hello").unwrap();

    assert_eq!(addr, ADDR_FREE_START);
    assert_eq!(storage.free_addr(), ADDR_FREE_START + RECORD_HEADER_SIZE + 5);
    assert_eq!(&storage.read_data(addr).unwrap()[..], b"hello");
}

#[test]
fn test_records_are_appended_in_order() {
    let mut storage = Storage::memory().unwrap();

    let a = storage.write_data(b"first").unwrap();
    let b = storage.write_data(b"second").unwrap();
    let c = storage.write_data(b"").unwrap();

    assert!(a < b && b < c);
    assert_eq!(&storage.read_data(a).unwrap()[..], b"first");
    assert_eq!(&storage.read_data(b).unwrap()[..], b"second");
    assert!(storage.read_data(c).unwrap().is_empty());
}

#[test]
fn test_write_data_advances_free_addr_on_disk() {
    let (_temp, path) = setup_temp_path();

    let free = {
        let mut storage = Storage::open_path(&path).unwrap();
        storage.write_data(b"garbage until referenced").unwrap();
        storage.free_addr()
    };

    let storage = Storage::open_path(&path).unwrap();
    assert_eq!(storage.free_addr(), free);
    assert_eq!(storage.root_addr(), ADDR_NONE);
}

#[test]
fn test_save_load_memory_image() {
    let mut storage = Storage::memory().unwrap();
    let addr1 = storage.write_data(b"k1=v1").unwrap();
    let addr2 = storage.write_data(b"k2=v2").unwrap();
    storage.set_root_addr(addr1).unwrap();

    let image = storage.to_bytes().unwrap();
    let mut reopened = Storage::from_bytes(image).unwrap();

    assert_eq!(reopened.root_addr(), addr1);
    assert_eq!(&reopened.read_data(addr1).unwrap()[..], b"k1=v1");
    assert_eq!(&reopened.read_data(addr2).unwrap()[..], b"k2=v2");
}

#[test]
fn test_file_storage_has_no_memory_image() {
    let (_temp, path) = setup_temp_path();
    let storage = Storage::open_path(&path).unwrap();

    assert!(storage.to_bytes().is_none());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_read_header_address_is_corrupt() {
    let mut storage = Storage::memory().unwrap();
    storage.write_data(b"data").unwrap();

    let result = storage.read_data(ADDR_NONE);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_read_past_free_addr_is_corrupt() {
    let mut storage = Storage::memory().unwrap();
    let addr = storage.write_data(b"data").unwrap();

    let result = storage.read_data(addr + 1000);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_read_near_max_address_is_corrupt() {
    let mut storage = Storage::memory().unwrap();
    storage.write_data(b"x").unwrap();

    for addr in [u64::MAX, u64::MAX - 2, u64::MAX - RECORD_HEADER_SIZE] {
        let result = storage.read_data(addr);
        assert!(matches!(result, Err(ArborError::CorruptStore(_))), "{}", addr);
    }
}

#[test]
fn test_checksum_mismatch_is_corrupt() {
    let (_temp, path) = setup_temp_path();

    let addr = {
        let mut storage = Storage::open_path(&path).unwrap();
        let addr = storage.write_data(b"payload").unwrap();
        storage.close().unwrap();
        addr
    };

    // First payload byte sits right after the frame header
    corrupt_byte(&path, addr + RECORD_HEADER_SIZE);

    let mut storage = Storage::open_path(&path).unwrap();
    let result = storage.read_data(addr);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_oversized_length_prefix_is_corrupt() {
    let (_temp, path) = setup_temp_path();

    let addr = {
        let mut storage = Storage::open_path(&path).unwrap();
        let addr = storage.write_data(b"short").unwrap();
        storage.close().unwrap();
        addr
    };

    // Highest byte of the little-endian length prefix
    corrupt_byte(&path, addr + 3);

    let mut storage = Storage::open_path(&path).unwrap();
    let result = storage.read_data(addr);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_truncated_header_is_corrupt() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

    let result = Storage::open_path(&path);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_free_addr_past_eof_is_corrupt() {
    let (_temp, path) = setup_temp_path();
    let mut header = Vec::new();
    header.extend_from_slice(&0u64.to_le_bytes());
    header.extend_from_slice(&4096u64.to_le_bytes());
    fs::write(&path, header).unwrap();

    let result = Storage::open_path(&path);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

#[test]
fn test_root_addr_inside_header_is_corrupt() {
    let (_temp, path) = setup_temp_path();
    let mut header = Vec::new();
    header.extend_from_slice(&8u64.to_le_bytes());
    header.extend_from_slice(&16u64.to_le_bytes());
    fs::write(&path, header).unwrap();

    let result = Storage::open_path(&path);
    assert!(matches!(result, Err(ArborError::CorruptStore(_))));
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_commit_syncs_records_then_header() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();
    let mut tree = BinaryTree::new();
    let before = storage.sync_count();

    tree.set(&mut storage, &Bytes::from_static(b"k"), &Bytes::from_static(b"v")).unwrap();
    tree.commit(&mut storage).unwrap();

    assert_eq!(storage.sync_count() - before, 2);
}

#[test]
fn test_header_only_commit_syncs_once() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();
    let mut tree = BinaryTree::new();
    tree.set(&mut storage, &Bytes::from_static(b"k"), &Bytes::from_static(b"v")).unwrap();
    tree.commit(&mut storage).unwrap();
    let before = storage.sync_count();

    // Removing the only key publishes the empty root without new records
    tree.delete(&mut storage, b"k").unwrap();
    tree.commit(&mut storage).unwrap();

    assert_eq!(storage.sync_count() - before, 1);
}

#[test]
fn test_os_managed_commit_never_syncs() {
    let (_temp, path) = setup_temp_path();
    let config = Config::builder()
        .path(&path)
        .sync_strategy(SyncStrategy::OsManaged)
        .build();
    let mut storage = Storage::open(&config).unwrap();
    let mut tree = BinaryTree::new();

    tree.set(&mut storage, &Bytes::from_static(b"k"), &Bytes::from_static(b"v")).unwrap();
    tree.commit(&mut storage).unwrap();

    assert_eq!(storage.sync_count(), 0);
}

#[test]
fn test_noop_commit_does_not_sync() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();
    let mut tree = BinaryTree::new();
    tree.set(&mut storage, &Bytes::from_static(b"k"), &Bytes::from_static(b"v")).unwrap();
    tree.commit(&mut storage).unwrap();
    let before = storage.sync_count();

    assert!(!tree.commit(&mut storage).unwrap());

    assert_eq!(storage.sync_count(), before);
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_open_missing_without_create_fails() {
    let (_temp, path) = setup_temp_path();
    let config = Config::builder().path(&path).create_if_missing(false).build();

    let result = Storage::open(&config);

    assert!(matches!(result, Err(ArborError::Io(_))));
    assert!(!path.exists());
}

#[test]
fn test_open_empty_path_is_config_error() {
    let config = Config::builder().path("").build();

    let result = Storage::open(&config);
    assert!(matches!(result, Err(ArborError::Config(_))));
}

#[test]
fn test_open_directory_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().path(temp_dir.path()).build();

    let result = Storage::open(&config);
    assert!(matches!(result, Err(ArborError::Config(_))));
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_lock_is_reentrant() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();

    assert!(storage.lock().unwrap());
    assert!(!storage.lock().unwrap());
    assert!(storage.is_locked());

    storage.unlock().unwrap();
    assert!(!storage.is_locked());

    // Unlocking twice is harmless
    storage.unlock().unwrap();
}

#[test]
fn test_with_lock_releases_on_error() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();

    let result: arbordb::Result<()> = storage.with_lock(|s| {
        assert!(s.is_locked());
        Err(ArborError::KeyNotFound)
    });

    assert!(matches!(result, Err(ArborError::KeyNotFound)));
    assert!(!storage.is_locked());
}

#[test]
fn test_with_lock_keeps_outer_lock() {
    let (_temp, path) = setup_temp_path();
    let mut storage = Storage::open_path(&path).unwrap();

    storage.lock().unwrap();
    storage.with_lock(|s| s.reload()).unwrap();

    assert!(storage.is_locked());
    storage.unlock().unwrap();
}

#[test]
fn test_lock_excludes_second_handle() {
    let (_temp, path) = setup_temp_path();
    let mut holder = Storage::open_path(&path).unwrap();
    let mut waiter = Storage::open_path(&path).unwrap();

    holder.lock().unwrap();
    let addr = holder.write_data(b"before release").unwrap();
    holder.set_root_addr(addr).unwrap();

    let handle = std::thread::spawn(move || {
        waiter
            .with_lock(|s| {
                s.reload()?;
                Ok(s.root_addr())
            })
            .unwrap()
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    holder.unlock().unwrap();

    assert_eq!(handle.join().unwrap(), addr);
}
