use std::fs;

use chrono::{Duration, Utc};

use crate::archive::artifact_key;
use crate::commands::prune;
use crate::manifest::{BackupId, BackupType};
use crate::store::{LocalStore, RemoteStore};
use crate::testutil::{test_config, MemoryRemote};

const RETENTION_DAYS: u32 = 30;

fn id_aged(seconds_past_cutoff: i64, now: chrono::DateTime<Utc>) -> String {
    let created = now - Duration::days(RETENTION_DAYS as i64) - Duration::seconds(seconds_past_cutoff);
    BackupId::new(BackupType::Database, created).to_string()
}

#[test]
fn local_retention_boundary_is_exact_to_the_second() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let local = LocalStore::open(cfg.local_root()).unwrap();
    let now = Utc::now();

    let expired = artifact_key(&id_aged(1, now), false);
    let fresh = artifact_key(&id_aged(-1, now), false);
    fs::write(local.root().join(&expired), b"old").unwrap();
    fs::write(local.root().join(&fresh), b"new").unwrap();

    let stats = prune::run(&cfg, None, RETENTION_DAYS, now).unwrap();

    assert_eq!(stats.local_deleted.len(), 1);
    assert_eq!(stats.local_kept, 1);
    assert!(!local.exists(&expired).unwrap());
    assert!(local.exists(&fresh).unwrap());
}

#[test]
fn remote_pruning_uses_remote_reported_timestamps() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let now = Utc::now();
    let remote = MemoryRemote::new();

    // Remote timestamps are authoritative for the remote location, even
    // when the id embedded in the key disagrees.
    let recent_id = BackupId::new(BackupType::Logs, now).to_string();
    remote.insert(
        &artifact_key(&recent_id, false),
        b"uploaded long ago",
        now - Duration::days(RETENTION_DAYS as i64 + 5),
    );
    let old_id = BackupId::new(BackupType::Logs, now - Duration::days(90)).to_string();
    remote.insert(
        &artifact_key(&old_id, true),
        b"re-uploaded yesterday",
        now - Duration::days(1),
    );

    let stats = prune::run(&cfg, Some(&remote), RETENTION_DAYS, now).unwrap();

    assert_eq!(stats.remote_deleted, vec![recent_id]);
    assert_eq!(stats.remote_kept, 1);
    assert_eq!(stats.local_deleted.len(), 0);
    assert_eq!(remote.keys(), vec![artifact_key(&old_id, true)]);
}

#[test]
fn local_and_remote_prune_independently() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let local = LocalStore::open(cfg.local_root()).unwrap();
    let now = Utc::now();
    let remote = MemoryRemote::new();

    // Same set exists in both places; only the local copy is out of window
    // (the remote object was mirrored recently).
    let id = id_aged(3600, now);
    let key = artifact_key(&id, false);
    fs::write(local.root().join(&key), b"local copy").unwrap();
    remote.insert(&key, b"remote copy", now - Duration::days(2));

    let stats = prune::run(&cfg, Some(&remote), RETENTION_DAYS, now).unwrap();

    assert_eq!(stats.local_deleted, vec![id]);
    assert!(stats.remote_deleted.is_empty());
    assert!(!local.exists(&key).unwrap());
    assert!(remote.exists(&key).unwrap());
}

#[test]
fn non_artifact_and_unparseable_keys_are_left_alone() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let local = LocalStore::open(cfg.local_root()).unwrap();
    let now = Utc::now();

    fs::write(local.root().join("README.txt"), b"not a backup").unwrap();
    fs::write(
        local.root().join("mystery_20000101_000000.tar.zst"),
        b"unknown type token",
    )
    .unwrap();

    let stats = prune::run(&cfg, None, RETENTION_DAYS, now).unwrap();
    assert!(stats.local_deleted.is_empty());
    assert!(local.root().join("README.txt").exists());
    assert!(local.root().join("mystery_20000101_000000.tar.zst").exists());
}

#[test]
fn prune_sweeps_stale_temp_files() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let local = LocalStore::open(cfg.local_root()).unwrap();
    let now = Utc::now();

    let stale = local.root().join(".pack-leftover");
    fs::write(&stale, b"crashed mid-pack").unwrap();
    let two_days_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(2 * 24 * 3600);
    let handle = fs::OpenOptions::new().write(true).open(&stale).unwrap();
    handle.set_modified(two_days_ago).unwrap();
    drop(handle);

    let fresh = local.root().join(".staging-current");
    fs::create_dir(&fresh).unwrap();

    prune::run(&cfg, None, RETENTION_DAYS, now).unwrap();

    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[test]
fn empty_storage_prunes_to_empty_stats() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let stats = prune::run(&cfg, None, RETENTION_DAYS, Utc::now()).unwrap();
    assert!(stats.local_deleted.is_empty());
    assert!(stats.remote_deleted.is_empty());
    assert_eq!(stats.local_kept, 0);
    assert_eq!(stats.remote_kept, 0);
}
