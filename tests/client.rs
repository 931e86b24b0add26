//! Integration tests for mount-addressed access through `FsClient`.
//!
//! Run with: `cargo test --test client`

use std::sync::Arc;

use tempfile::tempdir;

use hakkit_fs::Error;
use hakkit_fs::accessor::WriteState;
use hakkit_fs::client::FsClient;
use hakkit_fs::formats::pfs0::{PartitionFsBuilder, Pfs0Entry};
use hakkit_fs::fs::{
    CreateOptions, DirectoryEntry, InMemoryFileSystem, LocalFileSystem, OpenDirectoryMode,
    OpenMode, Pfs0FileSystem, WriteOption,
};
use hakkit_fs::storage::MemoryStorage;

// ============================================================================
// Helper Functions
// ============================================================================

fn client_with_save() -> FsClient {
    let client = FsClient::new();
    client
        .mount("save", Arc::new(InMemoryFileSystem::new()))
        .unwrap();
    client
        .create_file("save:/data.bin", 0, CreateOptions::empty())
        .unwrap();
    client
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A built PFS0 archive mounted by name lists and reads its files.
#[test]
fn mounted_partition_archive() {
    let mut builder = PartitionFsBuilder::new();
    builder
        .add_file("main", Arc::new(MemoryStorage::new(b"\x7fELF".to_vec())))
        .add_file("main.npdm", Arc::new(MemoryStorage::new(b"META".to_vec())));
    let image = builder.build::<Pfs0Entry>().unwrap();
    let client = FsClient::new();
    client
        .mount("exefs", Arc::new(Pfs0FileSystem::new(Arc::new(image)).unwrap()))
        .unwrap();

    assert_eq!(
        client.read_dir("exefs:/", OpenDirectoryMode::ALL).unwrap(),
        vec![DirectoryEntry::file("main", 4), DirectoryEntry::file("main.npdm", 4)]
    );
    let mut npdm = client.open_file("exefs:/main.npdm", OpenMode::READ).unwrap();
    assert_eq!(npdm.read_to_end().unwrap(), b"META".to_vec());
    drop(npdm);
    client.unmount("exefs").unwrap();
}

/// Writing without a flush and then closing the file is a caller bug.
#[test]
#[should_panic(expected = "still needs a flush")]
fn closing_an_unflushed_file_panics() {
    let client = client_with_save();
    let mut file = client.open_file("save:/data.bin", OpenMode::ALL).unwrap();
    file.write(0, b"unsaved", WriteOption::empty()).unwrap();
    assert_eq!(file.write_state(), WriteState::NeedsFlush);
    drop(file);
}

#[test]
fn flushed_files_close_cleanly() {
    let client = client_with_save();
    let mut file = client.open_file("save:/data.bin", OpenMode::ALL).unwrap();
    file.write(0, b"saved", WriteOption::empty()).unwrap();
    file.flush().unwrap();
    drop(file);
    client.commit("save").unwrap();
    client.unmount("save").unwrap();
}

#[test]
#[should_panic(expected = "still open")]
fn unmounting_with_an_open_file_panics() {
    let client = client_with_save();
    let _file = client.open_file("save:/data.bin", OpenMode::READ).unwrap();
    let _ = client.unmount("save");
}

#[test]
fn commit_refuses_open_writers() {
    let client = client_with_save();
    let reader = client.open_file("save:/data.bin", OpenMode::READ).unwrap();
    client.commit("save").unwrap();
    let writer = client.open_file("save:/data.bin", OpenMode::WRITE).unwrap();
    assert!(matches!(client.commit("save"), Err(Error::WriteModeFileNotClosed)));
    drop(writer);
    drop(reader);
    client.commit("save").unwrap();
}

/// Two clients own separate mount tables.
#[test]
fn clients_do_not_share_mounts() {
    let host = tempdir().unwrap();
    let first = FsClient::new();
    let second = FsClient::new();
    first
        .mount("host", Arc::new(LocalFileSystem::new(host.path()).unwrap()))
        .unwrap();
    second
        .mount("host", Arc::new(InMemoryFileSystem::new()))
        .unwrap();

    first.create_directory("host:/logs").unwrap();
    assert!(host.path().join("logs").is_dir());
    assert!(matches!(second.entry_type("host:/logs"), Err(Error::PathNotFound)));
    assert!(matches!(
        first.mount("host", Arc::new(InMemoryFileSystem::new())),
        Err(Error::MountNameAlreadyExists)
    ));
}
