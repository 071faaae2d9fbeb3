pub mod fs_remote;
pub mod local;

use std::fmt;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use fs_remote::FsRemote;
pub use local::LocalStore;

use crate::error::{Result, StackupError};

/// One object in a storage listing.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Tags attached to an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub backup_id: String,
    pub backup_type: String,
    pub encrypted: bool,
}

/// Where an artifact lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Local,
    Remote,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local => f.write_str("local"),
            Location::Remote => f.write_str("remote"),
        }
    }
}

/// The object-storage collaborator holding mirrored backup artifacts.
///
/// The orchestrators depend only on this interface; the bundled
/// implementation is a directory mirror, and bucket-backed or test-double
/// implementations slot in without touching the core.
pub trait RemoteStore {
    /// Upload a local file under `key` with metadata tags. Must publish
    /// atomically; a concurrent listing never sees a partial object.
    fn put(&self, key: &str, src: &Path, meta: &ObjectMeta) -> Result<()>;

    /// Download `key` into `dest`. Returns `false` if the key does not exist.
    fn fetch(&self, key: &str, dest: &Path) -> Result<bool>;

    /// Enumerate stored objects with remote-authoritative timestamps.
    fn list(&self) -> Result<Vec<StoredObject>>;

    /// Remove `key`; removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;
}

/// Reject storage keys that could escape the storage root.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StackupError::InvalidFormat(
            "unsafe storage key: empty".into(),
        ));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StackupError::InvalidFormat(format!(
            "unsafe storage key: '{key}'"
        )));
    }
    for component in Path::new(key).components() {
        if component == Component::ParentDir {
            return Err(StackupError::InvalidFormat(format!(
                "unsafe storage key: parent traversal '{key}'"
            )));
        }
    }
    Ok(())
}
