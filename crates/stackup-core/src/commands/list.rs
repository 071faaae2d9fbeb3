use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::archive::parse_artifact_key;
use crate::error::Result;
use crate::manifest::BackupId;
use crate::store::{LocalStore, Location, RemoteStore};

/// One row of `stackup list`.
#[derive(Debug, Clone)]
pub struct BackupListEntry {
    pub id: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub location: Location,
    pub encrypted: bool,
}

/// Merge local and remote listings, local first, deduplicated by id with the
/// local entry's metadata winning. Sorted oldest to newest.
pub fn run(
    local: &LocalStore,
    remote: Option<&dyn RemoteStore>,
) -> Result<Vec<BackupListEntry>> {
    let mut entries: Vec<BackupListEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for obj in local.list()? {
        if let Some(entry) = entry_from_key(&obj.key, obj.size, Location::Local) {
            seen.insert(entry.id.clone());
            entries.push(entry);
        }
    }

    if let Some(remote) = remote {
        for obj in remote.list()? {
            if let Some(entry) = entry_from_key(&obj.key, obj.size, Location::Remote) {
                if seen.insert(entry.id.clone()) {
                    entries.push(entry);
                }
            }
        }
    }

    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(entries)
}

fn entry_from_key(key: &str, size: u64, location: Location) -> Option<BackupListEntry> {
    let (id, encrypted) = parse_artifact_key(key)?;
    match BackupId::parse(id) {
        Ok(parsed) => Some(BackupListEntry {
            id: id.to_string(),
            size_bytes: size,
            created_at: parsed.created_at,
            location,
            encrypted,
        }),
        Err(e) => {
            warn!(key, error = %e, "ignoring artifact with unparseable id");
            None
        }
    }
}
