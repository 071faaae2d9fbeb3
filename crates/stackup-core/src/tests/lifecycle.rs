use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::archive;
use crate::commands::{create, list, restore, sync, verify, Collaborators};
use crate::config::StackupConfig;
use crate::error::StackupError;
use crate::lock::OpLock;
use crate::manifest::BackupType;
use crate::platform;
use crate::store::{LocalStore, Location, RemoteStore};
use crate::testutil::{
    seed_sources, test_config, MemoryCache, MemoryDatabase, MemoryRemote, RecordingSupervisor,
};

const DB_DUMP: &[u8] = b"CREATE TABLE users (id int, name text);\nINSERT INTO users VALUES (1,'a'),(2,'b'),(3,'c');\n";
const CACHE_DATA: &[u8] = b"REDIS0011\xfa\x09fake-rdb-payload";

struct Fixture {
    root: TempDir,
    cfg: StackupConfig,
    db: MemoryDatabase,
    cache: MemoryCache,
    supervisor: RecordingSupervisor,
    remote: MemoryRemote,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        seed_sources(root.path());
        let cfg = test_config(root.path());
        Self {
            root,
            cfg,
            db: MemoryDatabase::with_data(DB_DUMP),
            cache: MemoryCache::with_data(CACHE_DATA),
            supervisor: RecordingSupervisor::new(),
            remote: MemoryRemote::new(),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            database: &self.db,
            cache: &self.cache,
            supervisor: &self.supervisor,
            remote: Some(&self.remote),
        }
    }

    fn lock(&self) -> OpLock {
        OpLock::acquire(self.cfg.local_root()).unwrap()
    }

    fn create(&self, backup_type: BackupType) -> create::CreateOutcome {
        let lock = self.lock();
        create::run(
            &self.cfg,
            &self.collaborators(),
            &lock,
            None,
            &create::CreateRequest {
                backup_type,
                compression_level: None,
                upload: false,
            },
        )
        .unwrap()
    }

    fn artifact_path(&self, key: &str) -> PathBuf {
        self.cfg.local_root().join(key)
    }
}

#[test]
fn full_backup_stages_all_components() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Full);

    assert_eq!(outcome.components.len(), 5);
    assert!(outcome.skipped.is_empty());
    assert!(!outcome.is_partial());
    assert!(!outcome.encrypted);
    assert!(outcome.key.ends_with(".tar.zst"));
    assert_eq!(outcome.locations, vec![Location::Local]);
    assert!(fx.artifact_path(&outcome.key).is_file());
    assert!(outcome.artifact_size > 0);

    // Staging is gone on success.
    let leftovers: Vec<_> = fs::read_dir(fx.cfg.local_root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn full_roundtrip_restores_identical_content() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Full);

    // Damage the live state.
    *fx.db.data.lock().unwrap() = b"DROPPED".to_vec();
    *fx.cache.live.lock().unwrap() = b"evicted".to_vec();

    let target = tempfile::tempdir().unwrap();
    let lock = fx.lock();
    let result = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: None,
            target_root: Some(target.path()),
        },
    )
    .unwrap();

    assert_eq!(result.id, outcome.id);
    assert!(!result.has_failures());
    assert!(result.resume_errors.is_empty());

    // Database and cache bytes came back exactly.
    assert_eq!(fx.db.restored.lock().unwrap().as_deref(), Some(DB_DUMP));
    assert_eq!(fx.cache.live.lock().unwrap().as_slice(), CACHE_DATA);

    // Application tree replayed under the target root, preserving its
    // original absolute structure.
    let app_src = fx.root.path().join("app");
    let replayed = target.path().join(platform::rootless(&app_src));
    assert_eq!(
        fs::read(replayed.join("server.py")).unwrap(),
        b"print('app')\n"
    );
    assert_eq!(
        fs::read(replayed.join("static/index.html")).unwrap(),
        b"<html></html>\n"
    );

    // Logs are archival: present in the set, skipped at replay.
    let logs = result
        .components
        .iter()
        .find(|c| c.component == "logs")
        .unwrap();
    assert!(matches!(logs.status, restore::ReplayStatus::Skipped(_)));

    // Quiesce order: app services stopped first, cache engine cycled
    // around the snapshot swap, services resumed in reverse.
    assert_eq!(
        fx.supervisor.events(),
        vec![
            "stop app-backend",
            "stop app-worker",
            "stop redis-server",
            "start redis-server",
            "start app-worker",
            "start app-backend",
        ]
    );
}

#[test]
fn tampered_artifact_fails_integrity_gate_before_any_replay() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Full);

    // Unpack, flip one byte inside the database dump, repack in place.
    let work = tempfile::tempdir().unwrap();
    let artifact = fx.artifact_path(&outcome.key);
    archive::unpack_tree(fs::File::open(&artifact).unwrap(), work.path()).unwrap();
    let dump_path = work.path().join("database/dump.sql");
    let mut dump = fs::read(&dump_path).unwrap();
    dump[0] ^= 0x01;
    fs::write(&dump_path, &dump).unwrap();
    let out = fs::File::create(&artifact).unwrap();
    archive::pack_tree(work.path(), 3, out).unwrap();

    let lock = fx.lock();
    let err = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: None,
            target_root: None,
        },
    )
    .unwrap_err();

    match err {
        StackupError::IntegrityCheckFailed { component } => assert_eq!(component, "database"),
        other => panic!("expected IntegrityCheckFailed, got {other}"),
    }
    // Nothing external was touched.
    assert!(fx.supervisor.events().is_empty());
    assert!(fx.db.restored.lock().unwrap().is_none());
}

#[test]
fn encrypted_backup_replaces_plaintext_artifact() {
    let fx = Fixture::new();
    let lock = fx.lock();
    let outcome = create::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        Some("correct horse"),
        &create::CreateRequest {
            backup_type: BackupType::Full,
            compression_level: None,
            upload: false,
        },
    )
    .unwrap();
    drop(lock);

    assert!(outcome.encrypted);
    assert!(outcome.key.ends_with(".tar.zst.enc"));
    assert!(fx.artifact_path(&outcome.key).is_file());
    // The plaintext archive is never left next to the encrypted copy.
    assert!(!fx
        .artifact_path(&archive::artifact_key(&outcome.id, false))
        .is_file());
}

#[test]
fn encrypted_roundtrip_and_wrong_passphrase() {
    let fx = Fixture::new();
    let lock = fx.lock();
    let outcome = create::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        Some("correct horse"),
        &create::CreateRequest {
            backup_type: BackupType::Full,
            compression_level: None,
            upload: false,
        },
    )
    .unwrap();
    drop(lock);

    // Wrong passphrase: fatal, and no replay happened.
    let lock = fx.lock();
    let err = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: Some("battery staple"),
            target_root: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StackupError::DecryptionFailed));
    assert!(fx.supervisor.events().is_empty());
    assert!(fx.db.restored.lock().unwrap().is_none());
    drop(lock);

    // Missing passphrase is a configuration error, not a decryption failure.
    let lock = fx.lock();
    let err = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: None,
            target_root: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StackupError::Config(_)));
    drop(lock);

    // Correct passphrase restores.
    let target = tempfile::tempdir().unwrap();
    let lock = fx.lock();
    let result = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: Some("correct horse"),
            target_root: Some(target.path()),
        },
    )
    .unwrap();
    assert!(!result.has_failures());
    assert_eq!(fx.db.restored.lock().unwrap().as_deref(), Some(DB_DUMP));
}

#[test]
fn critical_component_failure_aborts_creation() {
    let root = tempfile::tempdir().unwrap();
    seed_sources(root.path());
    let cfg = test_config(root.path());
    let db = MemoryDatabase::failing();
    let cache = MemoryCache::with_data(CACHE_DATA);
    let supervisor = RecordingSupervisor::new();
    let collab = Collaborators {
        database: &db,
        cache: &cache,
        supervisor: &supervisor,
        remote: None,
    };

    let lock = OpLock::acquire(cfg.local_root()).unwrap();
    let err = create::run(
        &cfg,
        &collab,
        &lock,
        None,
        &create::CreateRequest {
            backup_type: BackupType::Full,
            compression_level: None,
            upload: false,
        },
    )
    .unwrap_err();
    drop(lock);

    match err {
        StackupError::ComponentProducerFailed { component, .. } => {
            assert_eq!(component, "database")
        }
        other => panic!("expected ComponentProducerFailed, got {other}"),
    }

    // Partial staging was discarded and no artifact was registered.
    let store = LocalStore::open(cfg.local_root()).unwrap();
    assert!(store.list().unwrap().is_empty());
    let leftovers: Vec<_> = fs::read_dir(cfg.local_root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn best_effort_component_failure_degrades_to_warning() {
    let fx = Fixture::new();
    // Remove the logs source entirely.
    fs::remove_dir_all(fx.root.path().join("logs")).unwrap();

    let outcome = fx.create(BackupType::Full);
    assert_eq!(outcome.components.len(), 4);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].component, "logs");
    assert!(outcome.is_partial());
    assert!(outcome.components.iter().all(|c| c.name != "logs"));
}

#[test]
fn set_with_zero_components_is_not_registered() {
    let root = tempfile::tempdir().unwrap();
    let cfg = test_config(root.path());
    let db = MemoryDatabase::with_data(DB_DUMP);
    let cache = MemoryCache::failing();
    let supervisor = RecordingSupervisor::new();
    let collab = Collaborators {
        database: &db,
        cache: &cache,
        supervisor: &supervisor,
        remote: None,
    };

    let lock = OpLock::acquire(cfg.local_root()).unwrap();
    let err = create::run(
        &cfg,
        &collab,
        &lock,
        None,
        &create::CreateRequest {
            backup_type: BackupType::CacheStore,
            compression_level: None,
            upload: false,
        },
    )
    .unwrap_err();

    assert!(matches!(err, StackupError::EmptyBackupSet));
}

#[test]
fn upload_tags_artifact_and_failure_keeps_local_copy() {
    let fx = Fixture::new();
    let lock = fx.lock();
    let outcome = create::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        None,
        &create::CreateRequest {
            backup_type: BackupType::Full,
            compression_level: None,
            upload: true,
        },
    )
    .unwrap();
    drop(lock);

    assert_eq!(outcome.locations, vec![Location::Local, Location::Remote]);
    assert_eq!(fx.remote.keys(), vec![outcome.key.clone()]);
    let meta = fx.remote.meta_of(&outcome.key).unwrap();
    assert_eq!(meta.backup_id, outcome.id);
    assert_eq!(meta.backup_type, "full");
    assert!(!meta.encrypted);

    // Unreachable remote: reported, but the local artifact stands.
    let root = tempfile::tempdir().unwrap();
    seed_sources(root.path());
    let cfg = test_config(root.path());
    let db = MemoryDatabase::with_data(DB_DUMP);
    let cache = MemoryCache::with_data(CACHE_DATA);
    let supervisor = RecordingSupervisor::new();
    let bad_remote = MemoryRemote::failing_put();
    let collab = Collaborators {
        database: &db,
        cache: &cache,
        supervisor: &supervisor,
        remote: Some(&bad_remote),
    };
    let lock = OpLock::acquire(cfg.local_root()).unwrap();
    let outcome = create::run(
        &cfg,
        &collab,
        &lock,
        None,
        &create::CreateRequest {
            backup_type: BackupType::Full,
            compression_level: None,
            upload: true,
        },
    )
    .unwrap();
    assert!(outcome.upload_error.is_some());
    assert_eq!(outcome.locations, vec![Location::Local]);
    assert!(cfg.local_root().join(&outcome.key).is_file());
    assert!(outcome.is_partial());
}

#[test]
fn listing_is_empty_then_idempotent() {
    let fx = Fixture::new();
    let local = LocalStore::open(fx.cfg.local_root()).unwrap();
    assert!(list::run(&local, Some(&fx.remote)).unwrap().is_empty());

    let outcome = fx.create(BackupType::Logs);

    let first = list::run(&local, Some(&fx.remote)).unwrap();
    let second = list::run(&local, Some(&fx.remote)).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, outcome.id);
    assert_eq!(first[0].location, Location::Local);
    assert!(!first[0].encrypted);
    let first_ids: Vec<_> = first.iter().map(|e| e.id.clone()).collect();
    let second_ids: Vec<_> = second.iter().map(|e| e.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}

#[test]
fn listing_merges_remote_and_prefers_local_metadata() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Logs);

    // Same id on the remote plus a remote-only set.
    fx.remote
        .insert(&outcome.key, b"remote copy", chrono::Utc::now());
    fx.remote.insert(
        "database_20200101_000000.tar.zst.enc",
        b"old remote dump",
        chrono::Utc::now(),
    );

    let local = LocalStore::open(fx.cfg.local_root()).unwrap();
    let entries = list::run(&local, Some(&fx.remote)).unwrap();
    assert_eq!(entries.len(), 2);

    // Oldest first: the 2020 remote entry leads.
    assert_eq!(entries[0].id, "database_20200101_000000");
    assert_eq!(entries[0].location, Location::Remote);
    assert!(entries[0].encrypted);

    let ours = &entries[1];
    assert_eq!(ours.id, outcome.id);
    assert_eq!(ours.location, Location::Local);
    assert_ne!(ours.size_bytes, b"remote copy".len() as u64);
}

#[test]
fn restore_latest_resolves_newest_id() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Logs);

    let target = tempfile::tempdir().unwrap();
    let lock = fx.lock();
    let result = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: "latest",
            passphrase: None,
            target_root: Some(target.path()),
        },
    )
    .unwrap();
    assert_eq!(result.id, outcome.id);
}

#[test]
fn restore_falls_back_to_remote_artifact() {
    let fx = Fixture::new();
    let lock = fx.lock();
    let outcome = create::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        None,
        &create::CreateRequest {
            backup_type: BackupType::Database,
            compression_level: None,
            upload: true,
        },
    )
    .unwrap();
    drop(lock);

    // Local copy lost; only the remote mirror remains.
    let local = LocalStore::open(fx.cfg.local_root()).unwrap();
    local.delete(&outcome.key).unwrap();
    *fx.db.data.lock().unwrap() = Vec::new();

    let lock = fx.lock();
    let result = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: None,
            target_root: None,
        },
    )
    .unwrap();
    assert!(!result.has_failures());
    assert_eq!(fx.db.restored.lock().unwrap().as_deref(), Some(DB_DUMP));
}

#[test]
fn restore_unknown_id_is_backup_not_found() {
    let fx = Fixture::new();
    let lock = fx.lock();
    let err = restore::run(
        &fx.cfg,
        &fx.collaborators(),
        &lock,
        &restore::RestoreRequest {
            id: "full_19990101_000000",
            passphrase: None,
            target_root: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StackupError::BackupNotFound(_)));
}

#[test]
fn quiesce_failure_aborts_and_resumes_already_stopped_services() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Full);

    let supervisor = RecordingSupervisor::failing_stop("app-worker");
    let collab = Collaborators {
        database: &fx.db,
        cache: &fx.cache,
        supervisor: &supervisor,
        remote: None,
    };
    let lock = fx.lock();
    let err = restore::run(
        &fx.cfg,
        &collab,
        &lock,
        &restore::RestoreRequest {
            id: &outcome.id,
            passphrase: None,
            target_root: None,
        },
    )
    .unwrap_err();

    assert!(matches!(err, StackupError::ServiceQuiesce { .. }));
    // app-backend stopped before the failure, so it was brought back.
    assert_eq!(
        supervisor.events(),
        vec!["stop app-backend", "start app-backend"]
    );
    assert!(fx.db.restored.lock().unwrap().is_none());
}

#[test]
fn verify_reports_ok_and_detects_tamper() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Full);

    let report = verify::run(&fx.cfg, Some(&fx.remote), None, "latest").unwrap();
    assert_eq!(report.id, outcome.id);
    assert!(report.all_ok());
    assert_eq!(report.components.len(), 5);

    // Flip a byte inside the config tree and repack.
    let work = tempfile::tempdir().unwrap();
    let artifact = fx.artifact_path(&outcome.key);
    archive::unpack_tree(fs::File::open(&artifact).unwrap(), work.path()).unwrap();
    let victim = find_first_file(&work.path().join("config")).unwrap();
    let mut bytes = fs::read(&victim).unwrap();
    bytes[0] ^= 0xFF;
    fs::write(&victim, &bytes).unwrap();
    let out = fs::File::create(&artifact).unwrap();
    archive::pack_tree(work.path(), 3, out).unwrap();

    let report = verify::run(&fx.cfg, Some(&fx.remote), None, &outcome.id).unwrap();
    assert!(!report.all_ok());
    let bad = report.components.iter().find(|c| !c.ok).unwrap();
    assert_eq!(bad.component, "config");
    assert!(bad.detail.as_deref().unwrap().contains("mismatch"));
}

#[test]
fn sync_uploads_once_and_tolerates_manual_remote_deletion() {
    let fx = Fixture::new();
    let outcome = fx.create(BackupType::Logs);

    let first = sync::run(&fx.cfg, &fx.remote, "latest").unwrap();
    assert_eq!(first.id, outcome.id);
    assert!(first.uploaded);

    let second = sync::run(&fx.cfg, &fx.remote, &outcome.id).unwrap();
    assert!(!second.uploaded);

    // A manual remote deletion is noticed by listing, not by a stale flag.
    fx.remote.delete(&outcome.key).unwrap();
    let third = sync::run(&fx.cfg, &fx.remote, &outcome.id).unwrap();
    assert!(third.uploaded);
    assert_eq!(fx.remote.keys(), vec![outcome.key.clone()]);
}

#[test]
fn second_operation_fails_while_lock_is_held() {
    let fx = Fixture::new();
    let _held = fx.lock();
    let err = OpLock::acquire(fx.cfg.local_root()).unwrap_err();
    assert!(matches!(err, StackupError::OperationInProgress(_)));
}

fn find_first_file(root: &Path) -> Option<PathBuf> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
}
