use std::fs;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::archive::parse_artifact_key;
use crate::config::StackupConfig;
use crate::error::Result;
use crate::manifest::BackupId;
use crate::staging::{PACK_PREFIX, SCRATCH_PREFIX, STAGING_PREFIX};
use crate::store::{LocalStore, RemoteStore};

/// Crashed staging/pack leftovers older than this are swept during prune.
const STALE_TEMP_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Default)]
pub struct PruneStats {
    pub local_deleted: Vec<String>,
    pub local_kept: usize,
    pub remote_deleted: Vec<String>,
    pub remote_kept: usize,
}

/// Delete artifacts past the retention window. Local artifacts are aged by
/// the timestamp embedded in their id; remote objects by the timestamp the
/// remote reports. The two locations are pruned independently.
pub fn run(
    cfg: &StackupConfig,
    remote: Option<&dyn RemoteStore>,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PruneStats> {
    let local = LocalStore::open(cfg.local_root())?;
    let cutoff = now - Duration::days(retention_days as i64);
    info!(retention_days, cutoff = %cutoff, "pruning backups");

    let mut stats = PruneStats::default();

    for obj in local.list()? {
        let Some((id, _)) = parse_artifact_key(&obj.key) else {
            continue;
        };
        let created_at = match BackupId::parse(id) {
            Ok(parsed) => parsed.created_at,
            Err(e) => {
                warn!(key = %obj.key, error = %e, "keeping artifact with unparseable id");
                continue;
            }
        };
        if created_at < cutoff {
            match local.delete(&obj.key) {
                Ok(()) => {
                    info!(id, key = %obj.key, "pruned local artifact");
                    stats.local_deleted.push(id.to_string());
                }
                Err(e) => warn!(key = %obj.key, error = %e, "failed to prune local artifact"),
            }
        } else {
            stats.local_kept += 1;
        }
    }

    if let Some(remote) = remote {
        for obj in remote.list()? {
            let Some((id, _)) = parse_artifact_key(&obj.key) else {
                continue;
            };
            if obj.last_modified < cutoff {
                match remote.delete(&obj.key) {
                    Ok(()) => {
                        info!(id, key = %obj.key, "pruned remote artifact");
                        stats.remote_deleted.push(id.to_string());
                    }
                    Err(e) => warn!(key = %obj.key, error = %e, "failed to prune remote artifact"),
                }
            } else {
                stats.remote_kept += 1;
            }
        }
    }

    sweep_stale_temps(&local);
    Ok(stats)
}

/// Remove hidden staging/scratch/pack leftovers from crashed runs. The
/// advisory lock guarantees none of them belong to a live operation once
/// they are this old.
fn sweep_stale_temps(local: &LocalStore) {
    let Ok(entries) = fs::read_dir(local.root()) else {
        return;
    };
    let max_age = StdDuration::from_secs(STALE_TEMP_SECS);
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_temp = name.starts_with(STAGING_PREFIX)
            || name.starts_with(SCRATCH_PREFIX)
            || name.starts_with(PACK_PREFIX);
        if !is_temp {
            continue;
        }
        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age > max_age);
        if !old_enough {
            continue;
        }
        debug!(name = %name, "sweeping stale temporary entry");
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to sweep stale temporary entry");
        }
    }
}
