use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::{self, artifact_key};
use crate::checksum;
use crate::error::{Result, StackupError};
use crate::manifest::{BackupId, ComponentArtifact, Manifest, MANIFEST_FILE};
use crate::store::{LocalStore, Location, RemoteStore};

use super::list;

/// Sentinel accepted wherever an explicit backup id is expected.
pub const LATEST: &str = "latest";

/// Resolve `latest` (newest by the timestamp embedded in the id, across both
/// locations) or validate an explicit id.
pub fn resolve_id(
    id_or_latest: &str,
    local: &LocalStore,
    remote: Option<&dyn RemoteStore>,
) -> Result<String> {
    if id_or_latest != LATEST {
        BackupId::parse(id_or_latest)?;
        return Ok(id_or_latest.to_string());
    }
    let entries = list::run(local, remote)?;
    entries
        .last()
        .map(|e| e.id.clone())
        .ok_or_else(|| StackupError::BackupNotFound(LATEST.into()))
}

/// An artifact found on disk, ready to open.
pub(crate) struct LocatedArtifact {
    pub key: String,
    pub encrypted: bool,
    pub path: PathBuf,
    pub location: Location,
}

/// Find a backup set's artifact: local plaintext, local encrypted, remote
/// plaintext, remote encrypted; first hit wins. Remote hits are downloaded
/// into `scratch`.
pub(crate) fn locate_artifact(
    id: &str,
    local: &LocalStore,
    remote: Option<&dyn RemoteStore>,
    scratch: &Path,
) -> Result<LocatedArtifact> {
    for encrypted in [false, true] {
        let key = artifact_key(id, encrypted);
        if local.exists(&key)? {
            return Ok(LocatedArtifact {
                path: local.path_of(&key)?,
                key,
                encrypted,
                location: Location::Local,
            });
        }
    }

    if let Some(remote) = remote {
        for encrypted in [false, true] {
            let key = artifact_key(id, encrypted);
            let dest = scratch.join(&key);
            let found = remote
                .fetch(&key, &dest)
                .map_err(|e| StackupError::DownloadFailed(format!("{key}: {e}")))?;
            if found {
                info!(key = %key, "fetched artifact from remote storage");
                return Ok(LocatedArtifact {
                    path: dest,
                    key,
                    encrypted,
                    location: Location::Remote,
                });
            }
        }
    }

    Err(StackupError::BackupNotFound(id.to_string()))
}

/// Extract an already-decrypted archive into `dest` and parse its manifest.
pub(crate) fn extract_and_read_manifest(archive_path: &Path, dest: &Path) -> Result<Manifest> {
    let file = File::open(archive_path)?;
    archive::unpack_tree(file, dest)?;

    let manifest_path = dest.join(MANIFEST_FILE);
    let data = std::fs::read(&manifest_path).map_err(|_| {
        StackupError::InvalidFormat("archive does not contain a manifest".into())
    })?;
    let manifest: Manifest = serde_json::from_slice(&data)?;
    Ok(manifest)
}

/// Recompute a component's checksum from the extracted tree.
/// Returns `None` if the artifact path is missing entirely.
pub(crate) fn recompute_checksum(
    extracted: &Path,
    artifact: &ComponentArtifact,
) -> Result<Option<String>> {
    let path = extracted.join(&artifact.path);
    if path.is_dir() {
        Ok(Some(checksum::sha256_tree(&path)?))
    } else if path.is_file() {
        Ok(Some(checksum::sha256_file(&path)?))
    } else {
        Ok(None)
    }
}
