use tracing::info;

use crate::config::StackupConfig;
use crate::envelope;
use crate::error::{Result, StackupError};
use crate::staging::{Staging, SCRATCH_PREFIX};
use crate::store::{LocalStore, RemoteStore};

use super::util::{extract_and_read_manifest, locate_artifact, recompute_checksum, resolve_id};

#[derive(Debug)]
pub struct ComponentCheck {
    pub component: String,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct VerifyReport {
    pub id: String,
    pub encrypted: bool,
    pub components: Vec<ComponentCheck>,
}

impl VerifyReport {
    pub fn all_ok(&self) -> bool {
        self.components.iter().all(|c| c.ok)
    }
}

/// Recompute every component checksum of a backup set against its manifest.
/// Touches nothing external; the artifact itself is never modified.
pub fn run(
    cfg: &StackupConfig,
    remote: Option<&dyn RemoteStore>,
    passphrase: Option<&str>,
    id_or_latest: &str,
) -> Result<VerifyReport> {
    let local = LocalStore::open(cfg.local_root())?;
    let id = resolve_id(id_or_latest, &local, remote)?;

    let scratch = Staging::create(local.root(), SCRATCH_PREFIX)?;
    let located = locate_artifact(&id, &local, remote, scratch.path())?;
    info!(id = %id, key = %located.key, location = %located.location, "verifying backup set");

    let archive_path = if located.encrypted {
        let pass = passphrase.ok_or_else(|| {
            StackupError::Config(
                "backup is encrypted; set STACKUP_PASSPHRASE to verify it".into(),
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

    let mut components = Vec::new();
    for artifact in &manifest.components {
        let check = match recompute_checksum(&extracted, artifact)? {
            Some(actual) if actual == artifact.checksum => ComponentCheck {
                component: artifact.name.clone(),
                ok: true,
                detail: None,
            },
            Some(actual) => ComponentCheck {
                component: artifact.name.clone(),
                ok: false,
                detail: Some(format!(
                    "checksum mismatch: manifest {}, recomputed {}",
                    artifact.checksum, actual
                )),
            },
            None => ComponentCheck {
                component: artifact.name.clone(),
                ok: false,
                detail: Some(format!("artifact missing from archive: {}", artifact.path)),
            },
        };
        components.push(check);
    }

    Ok(VerifyReport {
        id,
        encrypted: located.encrypted,
        components,
    })
}
