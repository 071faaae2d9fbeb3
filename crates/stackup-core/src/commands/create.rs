use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::{self, artifact_key};
use crate::checksum;
use crate::config::StackupConfig;
use crate::envelope;
use crate::error::{Result, StackupError};
use crate::lock::OpLock;
use crate::manifest::{
    BackupId, BackupType, Component, ComponentArtifact, Manifest, SystemFacts, MANIFEST_FILE,
    SCHEMA_VERSION,
};
use crate::platform;
use crate::staging::{Staging, PACK_PREFIX, STAGING_PREFIX};
use crate::store::{LocalStore, Location, ObjectMeta};

use super::Collaborators;

pub struct CreateRequest {
    pub backup_type: BackupType,
    /// zstd level 0-9; `None` takes the configured default.
    pub compression_level: Option<i32>,
    /// Upload the finished artifact to the configured remote.
    pub upload: bool,
}

/// A component that did not make it into the set (best-effort tier only;
/// a failed critical component aborts creation instead).
#[derive(Debug)]
pub struct ComponentFailure {
    pub component: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub id: String,
    pub key: String,
    pub artifact_size: u64,
    pub encrypted: bool,
    pub locations: Vec<Location>,
    pub components: Vec<ComponentArtifact>,
    pub skipped: Vec<ComponentFailure>,
    pub encryption_error: Option<String>,
    pub upload_error: Option<String>,
}

impl CreateOutcome {
    /// True when the set was produced but something degraded along the way.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty() || self.encryption_error.is_some() || self.upload_error.is_some()
    }
}

/// Produce one consistent backup set of the requested type.
///
/// The lock handle proves mutual exclusion is held for the whole operation.
pub fn run(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    _lock: &OpLock,
    passphrase: Option<&str>,
    req: &CreateRequest,
) -> Result<CreateOutcome> {
    if req.upload && collab.remote.is_none() {
        return Err(StackupError::Config(
            "remote upload requested but storage.remote_dir is not configured".into(),
        ));
    }

    let local = LocalStore::open(cfg.local_root())?;
    let id = BackupId::new(req.backup_type, Utc::now());
    let id_str = id.to_string();
    info!(id = %id_str, backup_type = %req.backup_type, "starting backup");

    let staging = Staging::create(local.root(), STAGING_PREFIX)?;

    let mut components: Vec<ComponentArtifact> = Vec::new();
    let mut skipped: Vec<ComponentFailure> = Vec::new();

    for component in req.backup_type.components() {
        match produce(cfg, collab, *component, staging.path()) {
            Ok(artifact) => {
                info!(
                    id = %id_str,
                    component = component.name(),
                    size_bytes = artifact.size_bytes,
                    "component staged"
                );
                components.push(artifact);
            }
            Err(e) if component.is_critical() => {
                // Database integrity gates the whole set; staging is
                // discarded by the scope guard on the way out.
                return Err(StackupError::ComponentProducerFailed {
                    component: component.name().to_string(),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    id = %id_str,
                    component = component.name(),
                    error = %e,
                    "best-effort component failed, continuing without it"
                );
                skipped.push(ComponentFailure {
                    component: component.name(),
                    message: e.to_string(),
                });
            }
        }
    }

    if components.is_empty() {
        return Err(StackupError::EmptyBackupSet);
    }

    let (database_version, cache_version) = capture_versions(collab, req.backup_type);

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        id: id_str.clone(),
        backup_type: req.backup_type,
        created_at: id.created_at,
        system: SystemFacts::collect(),
        database_version,
        cache_version,
        components: components.clone(),
    };
    fs::write(
        staging.path().join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    // Seal the staging tree into a single archive, published atomically.
    let level = req.compression_level.unwrap_or(cfg.compression.level);
    let plain_key = artifact_key(&id_str, false);
    let mut pack = tempfile::Builder::new()
        .prefix(PACK_PREFIX)
        .tempfile_in(local.root())?;
    archive::pack_tree(staging.path(), level, pack.as_file_mut())?;
    let plain_path = local.path_of(&plain_key)?;
    pack.persist(&plain_path)
        .map_err(|e| StackupError::ArchiveAssembly(e.error.to_string()))?;

    // Optional encryption envelope. Soft-fail: a backup we cannot encrypt
    // is still a backup, so the plaintext artifact is kept with a warning.
    let (key, encrypted, encryption_error) = match passphrase {
        Some(pass) => {
            let enc_key = artifact_key(&id_str, true);
            let enc_path = local.path_of(&enc_key)?;
            match envelope::seal_file(&plain_path, &enc_path, pass) {
                Ok(()) => {
                    fs::remove_file(&plain_path)?;
                    (enc_key, true, None)
                }
                Err(e) => {
                    warn!(id = %id_str, error = %e, "encryption failed, keeping plaintext artifact");
                    let _ = fs::remove_file(&enc_path);
                    (plain_key, false, Some(e.to_string()))
                }
            }
        }
        None => (plain_key, false, None),
    };

    let artifact_path = local.path_of(&key)?;
    let artifact_size = fs::metadata(&artifact_path)?.len();

    let mut locations = vec![Location::Local];
    let mut upload_error = None;
    if req.upload {
        // Checked non-None above.
        if let Some(remote) = collab.remote {
            let meta = ObjectMeta {
                backup_id: id_str.clone(),
                backup_type: req.backup_type.as_str().to_string(),
                encrypted,
            };
            match remote.put(&key, &artifact_path, &meta) {
                Ok(()) => {
                    info!(id = %id_str, key = %key, "artifact uploaded to remote storage");
                    locations.push(Location::Remote);
                }
                Err(e) => {
                    warn!(id = %id_str, error = %e, "upload failed, local artifact retained");
                    upload_error = Some(e.to_string());
                }
            }
        }
    }

    info!(
        id = %id_str,
        key = %key,
        artifact_size,
        encrypted,
        components = components.len(),
        skipped = skipped.len(),
        "backup complete"
    );

    Ok(CreateOutcome {
        id: id_str,
        key,
        artifact_size,
        encrypted,
        locations,
        components,
        skipped,
        encryption_error,
        upload_error,
    })
}

fn produce(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    component: Component,
    staging: &Path,
) -> Result<ComponentArtifact> {
    match component {
        Component::Database => produce_database(collab, staging),
        Component::CacheStore => produce_cache(collab, staging),
        Component::Application => produce_tree(component, &cfg.application.paths, staging),
        Component::Logs => produce_tree(component, &cfg.logs.paths, staging),
        Component::Config => produce_tree(component, &cfg.config_files.paths, staging),
    }
}

fn produce_database(collab: &Collaborators<'_>, staging: &Path) -> Result<ComponentArtifact> {
    let dump = collab.database.dump()?;
    let dir = staging.join(Component::Database.name());
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("dump.sql"), &dump)?;
    Ok(ComponentArtifact {
        name: Component::Database.name().to_string(),
        path: format!("{}/dump.sql", Component::Database.name()),
        size_bytes: dump.len() as u64,
        checksum: checksum::sha256_bytes(&dump),
    })
}

fn produce_cache(collab: &Collaborators<'_>, staging: &Path) -> Result<ComponentArtifact> {
    let snapshot = collab.cache.snapshot()?;
    let dir = staging.join(Component::CacheStore.name());
    fs::create_dir_all(&dir)?;
    let dest = dir.join("dump.rdb");
    let size_bytes = fs::copy(&snapshot, &dest)?;
    Ok(ComponentArtifact {
        name: Component::CacheStore.name().to_string(),
        path: format!("{}/dump.rdb", Component::CacheStore.name()),
        size_bytes,
        checksum: checksum::sha256_file(&dest)?,
    })
}

/// Stage a path-list component. Source paths keep their absolute structure
/// under the component directory so restore can replay them onto any root.
fn produce_tree(
    component: Component,
    paths: &[String],
    staging: &Path,
) -> Result<ComponentArtifact> {
    if paths.is_empty() {
        return Err(StackupError::Config(format!(
            "no {} paths configured",
            component.name()
        )));
    }

    let root = staging.join(component.name());
    fs::create_dir_all(&root)?;

    let mut copied_any = false;
    for path in paths {
        let src = Path::new(path);
        if !src.exists() {
            warn!(component = component.name(), path = %path, "source path missing, skipping");
            continue;
        }
        let dest: PathBuf = root.join(platform::rootless(src));
        platform::copy_tree(src, &dest)?;
        copied_any = true;
    }
    if !copied_any {
        return Err(StackupError::Other(format!(
            "none of the configured {} paths exist",
            component.name()
        )));
    }

    Ok(ComponentArtifact {
        name: component.name().to_string(),
        path: component.name().to_string(),
        size_bytes: checksum::tree_size(&root)?,
        checksum: checksum::sha256_tree(&root)?,
    })
}

/// Capture dependent-system version strings for the manifest. Informational
/// only, so failures degrade to `None` with a warning.
fn capture_versions(
    collab: &Collaborators<'_>,
    backup_type: BackupType,
) -> (Option<String>, Option<String>) {
    let wants_database = matches!(backup_type, BackupType::Full | BackupType::Database);
    let wants_cache = matches!(backup_type, BackupType::Full | BackupType::CacheStore);

    let database_version = if wants_database {
        match collab.database.version() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "could not capture database version");
                None
            }
        }
    } else {
        None
    };

    let cache_version = if wants_cache {
        match collab.cache.version() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "could not capture cache version");
                None
            }
        }
    } else {
        None
    };

    (database_version, cache_version)
}
