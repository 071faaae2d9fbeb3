use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::error::Result;

/// Prefix for backup staging directories.
pub const STAGING_PREFIX: &str = ".staging-";
/// Prefix for restore/verify scratch directories.
pub const SCRATCH_PREFIX: &str = ".scratch-";
/// Prefix for in-flight archive pack files.
pub const PACK_PREFIX: &str = ".pack-";

/// A scoped working directory under the local storage root.
///
/// Hidden (dot-prefixed) so artifact listings never see it, private to one
/// in-flight operation, and removed on drop on every exit path.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn create(root: &Path, prefix: &str) -> Result<Staging> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        Ok(Staging { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
