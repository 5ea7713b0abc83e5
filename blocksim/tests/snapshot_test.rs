use std::io::Write;

use blocksim::{AllocationMethod, DirectoryMethod, Disk, SimError, SpaceManagementMethod};
use tempfile::NamedTempFile;

fn populated_disk() -> Disk {
    let mut disk = Disk::new(32, 4).unwrap();
    let p = disk
        .create_partition(
            "home",
            4,
            27,
            AllocationMethod::Indexed,
            DirectoryMethod::Tree,
            SpaceManagementMethod::FreeList,
        )
        .unwrap()
        .id;
    disk.create_directory("src", p).unwrap();
    disk.change_directory(p, "src").unwrap();
    disk.create_file("main.rs", 9, p).unwrap();
    disk
}

#[test]
fn can_reopen_saved_session() {
    let tf = NamedTempFile::new().unwrap();
    let disk = populated_disk();

    disk.save_snapshot(tf.reopen().unwrap()).unwrap();

    let restored = Disk::open_snapshot(tf.path()).unwrap();
    assert_eq!(restored, disk);
    let p = restored.find_partition("HOME").unwrap().id;
    assert_eq!(restored.current_path(p).unwrap(), "/src");
}

#[test]
fn restored_session_keeps_allocating_ids() {
    let tf = NamedTempFile::new().unwrap();
    populated_disk().save_snapshot_to_path(tf.path()).unwrap();

    let mut disk = Disk::open_snapshot(tf.path()).unwrap();
    let p = disk.find_partition("home").unwrap().id;
    let id = disk.create_file("lib.rs", 1, p).unwrap().id;
    assert_eq!(id, 2);
}

#[test]
fn inconsistent_snapshot_is_rejected() {
    let disk = populated_disk();
    let mut json: serde_json::Value = serde_json::to_value(&disk).unwrap();
    json["partitions"]["1"]["usedBlocks"] = serde_json::json!(0);

    let mut tf = NamedTempFile::new().unwrap();
    tf.write_all(json.to_string().as_bytes()).unwrap();

    assert!(matches!(
        Disk::open_snapshot(tf.path()),
        Err(SimError::Inconsistent(_))
    ));
}

#[test]
fn snapshot_with_stale_id_counter_is_rejected() {
    let disk = populated_disk();
    let mut json: serde_json::Value = serde_json::to_value(&disk).unwrap();
    json["catalog"]["next_file_id"] = serde_json::json!(1);

    let mut tf = NamedTempFile::new().unwrap();
    tf.write_all(json.to_string().as_bytes()).unwrap();

    assert!(matches!(
        Disk::open_snapshot(tf.path()),
        Err(SimError::Inconsistent(_))
    ));
}

#[test]
fn missing_snapshot_returns_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Disk::open_snapshot(dir.path().join("absent.json")),
        Err(SimError::Io(_))
    ));
}
