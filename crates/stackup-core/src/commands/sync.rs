use tracing::info;

use crate::archive::artifact_key;
use crate::config::StackupConfig;
use crate::error::{Result, StackupError};
use crate::manifest::BackupId;
use crate::store::{LocalStore, ObjectMeta, RemoteStore};

use super::util::resolve_id;

#[derive(Debug)]
pub struct SyncOutcome {
    pub id: String,
    pub key: String,
    /// False when the remote already held the artifact.
    pub uploaded: bool,
}

/// Mirror one local artifact to remote storage if it is not already there.
/// Presence is checked by listing, not by a recorded flag, so manual remote
/// deletions are tolerated.
pub fn run(
    cfg: &StackupConfig,
    remote: &dyn RemoteStore,
    id_or_latest: &str,
) -> Result<SyncOutcome> {
    let local = LocalStore::open(cfg.local_root())?;
    let id = resolve_id(id_or_latest, &local, Some(remote))?;

    // The final artifact is whichever form exists locally; encrypted wins
    // if both somehow do.
    let mut found: Option<(String, bool)> = None;
    for encrypted in [true, false] {
        let key = artifact_key(&id, encrypted);
        if local.exists(&key)? {
            found = Some((key, encrypted));
            break;
        }
    }
    let Some((key, encrypted)) = found else {
        return Err(StackupError::BackupNotFound(id));
    };

    let already = remote
        .list()
        .map_err(|e| StackupError::UploadFailed(format!("remote listing: {e}")))?
        .iter()
        .any(|o| o.key == key);
    if already {
        info!(id = %id, key = %key, "artifact already present on remote");
        return Ok(SyncOutcome {
            id,
            key,
            uploaded: false,
        });
    }

    let parsed = BackupId::parse(&id)?;
    let meta = ObjectMeta {
        backup_id: id.clone(),
        backup_type: parsed.backup_type.as_str().to_string(),
        encrypted,
    };
    remote
        .put(&key, &local.path_of(&key)?, &meta)
        .map_err(|e| StackupError::UploadFailed(format!("{key}: {e}")))?;
    info!(id = %id, key = %key, "artifact uploaded to remote");

    Ok(SyncOutcome {
        id,
        key,
        uploaded: true,
    })
}
