use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{Result, StackupError};
use crate::store::{validate_key, StoredObject};

/// The local backup artifact directory, owned by this tool.
///
/// Append-only during create (artifacts land via atomic rename) and
/// delete-only during prune, so concurrent readers never observe a
/// half-written artifact. Hidden entries (lock file, staging dirs, pack
/// temp files) are invisible to listings.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_of(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a finished file into place under `key` and return its size.
    /// `src` must live on the same filesystem (staging keeps it under the
    /// storage root), so the publish step is a single atomic rename.
    pub fn adopt(&self, key: &str, src: &Path) -> Result<u64> {
        let dest = self.path_of(key)?;
        fs::rename(src, &dest).map_err(|e| {
            StackupError::ArchiveAssembly(format!(
                "publish {} -> {}: {e}",
                src.display(),
                dest.display()
            ))
        })?;
        Ok(fs::metadata(&dest)?.len())
    }

    /// Delete an artifact; deleting a missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List artifacts (non-hidden regular files) sorted by key.
    pub fn list(&self) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let last_modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            objects.push(StoredObject {
                key: name,
                size: meta.len(),
                last_modified,
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}
