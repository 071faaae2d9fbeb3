use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StackupError};
use crate::platform;

/// Lock file name inside the local storage directory.
pub const LOCK_FILE: &str = ".lock";

/// Locks older than this are treated as leftovers of a killed process.
const STALE_LOCK_SECS: i64 = 6 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct LockEntry {
    hostname: String,
    pid: u32,
    acquired_at: String,
}

/// Handle to the acquired operation lock. Released on drop.
///
/// Exactly one create or restore may run at a time; the handle is passed
/// into the orchestrators so holding it is visible in their signatures.
#[derive(Debug)]
pub struct OpLock {
    path: PathBuf,
}

impl OpLock {
    /// Acquire the advisory lock, failing immediately with
    /// [`StackupError::OperationInProgress`] if it is already held.
    pub fn acquire(storage_root: &Path) -> Result<OpLock> {
        fs::create_dir_all(storage_root)?;
        let path = storage_root.join(LOCK_FILE);

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::is_stale(&path) {
                    warn!(path = %path.display(), "removing stale operation lock");
                    let _ = fs::remove_file(&path);
                    Self::try_create(&path)
                        .map_err(|_| StackupError::OperationInProgress(Self::describe(&path)))
                } else {
                    Err(StackupError::OperationInProgress(Self::describe(&path)))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<OpLock> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let entry = LockEntry {
            hostname: platform::hostname(),
            pid: std::process::id(),
            acquired_at: Utc::now().to_rfc3339(),
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = file.write_all(&data);
        }
        debug!(path = %path.display(), "operation lock acquired");
        Ok(OpLock {
            path: path.to_path_buf(),
        })
    }

    /// A lock is stale if its entry is older than the threshold, or if the
    /// file is empty (creator was killed between create and write).
    fn is_stale(path: &Path) -> bool {
        let Ok(data) = fs::read(path) else {
            return false;
        };
        if data.is_empty() {
            return true;
        }
        let Ok(entry) = serde_json::from_slice::<LockEntry>(&data) else {
            return false;
        };
        let Ok(acquired) = DateTime::parse_from_rfc3339(&entry.acquired_at) else {
            return false;
        };
        Utc::now().signed_duration_since(acquired.with_timezone(&Utc))
            > Duration::seconds(STALE_LOCK_SECS)
    }

    fn describe(path: &Path) -> String {
        match fs::read(path)
            .ok()
            .and_then(|data| serde_json::from_slice::<LockEntry>(&data).ok())
        {
            Some(entry) => format!(
                "held by {} pid {} since {}",
                entry.hostname, entry.pid, entry.acquired_at
            ),
            None => format!("lock file: {}", path.display()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OpLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release operation lock");
            }
        }
    }
}
