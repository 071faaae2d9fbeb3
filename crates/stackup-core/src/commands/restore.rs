use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::StackupConfig;
use crate::envelope;
use crate::error::{Result, StackupError};
use crate::lock::OpLock;
use crate::manifest::{Component, Manifest};
use crate::platform;
use crate::staging::{Staging, SCRATCH_PREFIX};
use crate::store::LocalStore;

use super::util::{extract_and_read_manifest, locate_artifact, recompute_checksum, resolve_id};
use super::Collaborators;

/// Fixed replay order: the data layer first, then files, then configuration.
/// Logs are archival and never replayed.
const REPLAY_ORDER: [Component; 5] = [
    Component::Database,
    Component::CacheStore,
    Component::Application,
    Component::Logs,
    Component::Config,
];

pub struct RestoreRequest<'a> {
    /// Explicit backup id or `latest`.
    pub id: &'a str,
    pub passphrase: Option<&'a str>,
    /// Replay application/config trees under this root instead of `/`.
    pub target_root: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStatus {
    Replayed,
    Failed(String),
    Skipped(&'static str),
}

#[derive(Debug)]
pub struct ComponentReplay {
    pub component: String,
    pub status: ReplayStatus,
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub id: String,
    pub components: Vec<ComponentReplay>,
    /// Services that failed to come back after replay.
    pub resume_errors: Vec<String>,
}

impl RestoreOutcome {
    pub fn has_failures(&self) -> bool {
        !self.resume_errors.is_empty()
            || self
                .components
                .iter()
                .any(|c| matches!(c.status, ReplayStatus::Failed(_)))
    }
}

/// Reconstruct external system state from a named backup set.
///
/// All-or-nothing up to the integrity gate: nothing external is touched
/// until every component checksum has been verified. Replay failures after
/// the gate are reported per component; no rollback is attempted.
pub fn run(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    _lock: &OpLock,
    req: &RestoreRequest<'_>,
) -> Result<RestoreOutcome> {
    let local = LocalStore::open(cfg.local_root())?;
    let id = resolve_id(req.id, &local, collab.remote)?;
    if id != req.id {
        info!(requested = req.id, resolved = %id, "resolved backup id");
    }

    let scratch = Staging::create(local.root(), SCRATCH_PREFIX)?;
    let located = locate_artifact(&id, &local, collab.remote, scratch.path())?;
    info!(
        id = %id,
        key = %located.key,
        location = %located.location,
        encrypted = located.encrypted,
        "restoring backup set"
    );

    let archive_path = if located.encrypted {
        let pass = req.passphrase.ok_or_else(|| {
            StackupError::Config(
                "backup is encrypted; pass --decrypt or set STACKUP_PASSPHRASE".into(),
            )
        })?;
        let plain = scratch.path().join("archive.tar.zst");
        envelope::open_file(&located.path, &plain, pass)?;
        plain
    } else {
        located.path.clone()
    };

    let extracted = scratch.path().join("extracted");
    let manifest = extract_and_read_manifest(&archive_path, &extracted)?;
    verify_integrity(&extracted, &manifest)?;

    if let Some(v) = &manifest.database_version {
        info!(manifest_version = %v, "database version at backup time");
    }
    if let Some(v) = &manifest.cache_version {
        info!(manifest_version = %v, "cache version at backup time");
    }

    // Quiesce before replay. A stop failure aborts while the data layer is
    // still untouched; services already stopped are brought back up.
    let mut stopped: Vec<String> = Vec::new();
    for service in &cfg.services {
        match collab.supervisor.stop(service) {
            Ok(()) => stopped.push(service.clone()),
            Err(e) => {
                let resume_errors = resume_services(collab, &stopped);
                for err in &resume_errors {
                    warn!(error = %err, "service resume failed after aborted quiesce");
                }
                return Err(e);
            }
        }
    }

    let mut components: Vec<ComponentReplay> = Vec::new();
    for component in REPLAY_ORDER {
        let Some(artifact) = manifest.find_component(component.name()) else {
            continue;
        };
        let status = match component {
            Component::Logs => ReplayStatus::Skipped("archival only"),
            Component::Database => replay_database(collab, &extracted, &artifact.path),
            Component::CacheStore => replay_cache(cfg, collab, &extracted, &artifact.path),
            Component::Application | Component::Config => {
                replay_tree(&extracted, &artifact.path, req.target_root)
            }
        };
        match &status {
            ReplayStatus::Replayed => info!(id = %id, component = component.name(), "component replayed"),
            ReplayStatus::Failed(msg) => {
                warn!(id = %id, component = component.name(), error = %msg, "component replay failed")
            }
            ReplayStatus::Skipped(reason) => {
                info!(id = %id, component = component.name(), reason, "component skipped")
            }
        }
        components.push(ComponentReplay {
            component: component.name().to_string(),
            status,
        });
    }

    let resume_errors = resume_services(collab, &stopped);

    Ok(RestoreOutcome {
        id,
        components,
        resume_errors,
    })
}

/// Recompute every component checksum against the manifest. Every mismatch
/// is logged; the first one is carried in the error.
fn verify_integrity(extracted: &Path, manifest: &Manifest) -> Result<()> {
    let mut first_bad: Option<String> = None;
    for artifact in &manifest.components {
        let ok = match recompute_checksum(extracted, artifact)? {
            Some(actual) => actual == artifact.checksum,
            None => false,
        };
        if !ok {
            warn!(
                id = %manifest.id,
                component = %artifact.name,
                "checksum mismatch against manifest"
            );
            first_bad.get_or_insert_with(|| artifact.name.clone());
        }
    }
    match first_bad {
        Some(component) => Err(StackupError::IntegrityCheckFailed { component }),
        None => Ok(()),
    }
}

fn replay_database(
    collab: &Collaborators<'_>,
    extracted: &Path,
    artifact_path: &str,
) -> ReplayStatus {
    let dump = match fs::read(extracted.join(artifact_path)) {
        Ok(d) => d,
        Err(e) => return ReplayStatus::Failed(format!("read dump: {e}")),
    };
    match collab.database.restore(&dump) {
        Ok(()) => ReplayStatus::Replayed,
        Err(e) => ReplayStatus::Failed(e.to_string()),
    }
}

/// The cache engine must not hold its snapshot file open while it is
/// swapped, so the engine's own service is cycled around the copy.
fn replay_cache(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    extracted: &Path,
    artifact_path: &str,
) -> ReplayStatus {
    let service = &cfg.cache.service;
    if let Err(e) = collab.supervisor.stop(service) {
        return ReplayStatus::Failed(e.to_string());
    }

    let replace_result = collab.cache.replace_snapshot(&extracted.join(artifact_path));
    // Bring the engine back up even when the swap failed.
    let start_result = collab.supervisor.start(service);

    match (replace_result, start_result) {
        (Ok(()), Ok(())) => ReplayStatus::Replayed,
        (Err(e), _) => ReplayStatus::Failed(e.to_string()),
        (Ok(()), Err(e)) => ReplayStatus::Failed(format!("snapshot replaced but: {e}")),
    }
}

fn replay_tree(
    extracted: &Path,
    artifact_path: &str,
    target_root: Option<&Path>,
) -> ReplayStatus {
    let src = extracted.join(artifact_path);
    let dest = target_root.unwrap_or_else(|| Path::new("/"));
    match platform::copy_tree(&src, dest) {
        Ok(_) => ReplayStatus::Replayed,
        Err(e) => ReplayStatus::Failed(e.to_string()),
    }
}

fn resume_services(collab: &Collaborators<'_>, stopped: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    for service in stopped.iter().rev() {
        if let Err(e) = collab.supervisor.start(service) {
            errors.push(format!("{service}: {e}"));
            continue;
        }
        match collab.supervisor.is_running(service) {
            Ok(true) => {}
            Ok(false) => errors.push(format!("{service}: not running after start")),
            Err(e) => warn!(service = %service, error = %e, "could not confirm service state"),
        }
    }
    errors
}
