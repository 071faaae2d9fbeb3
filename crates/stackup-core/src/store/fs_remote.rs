use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::store::{validate_key, ObjectMeta, RemoteStore, StoredObject};

const TAGS_DIR: &str = ".tags";

/// Remote mirror backed by a directory: a mounted share, an NFS export, or
/// a bucket kept in sync by an external tool.
///
/// Metadata tags are persisted as hidden JSON sidecars; a bucket-backed
/// implementation would map them to object tags instead.
#[derive(Debug)]
pub struct FsRemote {
    root: PathBuf,
}

impl FsRemote {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn tag_path(&self, key: &str) -> PathBuf {
        self.root.join(TAGS_DIR).join(format!("{key}.json"))
    }
}

impl RemoteStore for FsRemote {
    fn put(&self, key: &str, src: &Path, meta: &ObjectMeta) -> Result<()> {
        let dest = self.object_path(key)?;
        let data = fs::read(src)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&data)?;
        tmp.persist(&dest).map_err(|e| e.error)?;

        // Tags are best-effort; the object itself is authoritative.
        let tag_path = self.tag_path(key);
        let write_tags = || -> std::io::Result<()> {
            if let Some(parent) = tag_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&tag_path, serde_json::to_vec(meta).unwrap_or_default())
        };
        if let Err(e) = write_tags() {
            warn!(key, error = %e, "failed to write remote metadata tags");
        }
        Ok(())
    }

    fn fetch(&self, key: &str, dest: &Path) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {
                fs::copy(&path, dest)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<StoredObject>> {
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

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _ = fs::remove_file(self.tag_path(key));
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
