use std::io::{Read, Write};
use std::path::{Component, Path};

use tracing::warn;

use crate::error::{Result, StackupError};

/// Suffix of a plaintext archive artifact.
pub const ARCHIVE_SUFFIX: &str = ".tar.zst";
/// Suffix of an encrypted archive artifact.
pub const ENCRYPTED_SUFFIX: &str = ".tar.zst.enc";

/// Storage key for a backup set's artifact.
pub fn artifact_key(id: &str, encrypted: bool) -> String {
    if encrypted {
        format!("{id}{ENCRYPTED_SUFFIX}")
    } else {
        format!("{id}{ARCHIVE_SUFFIX}")
    }
}

/// Split a storage key back into `(backup id, encrypted)`.
/// Returns `None` for keys that are not backup artifacts.
pub fn parse_artifact_key(key: &str) -> Option<(&str, bool)> {
    if let Some(id) = key.strip_suffix(ENCRYPTED_SUFFIX) {
        Some((id, true))
    } else {
        key.strip_suffix(ARCHIVE_SUFFIX).map(|id| (id, false))
    }
}

/// Pack a directory tree into a zstd-compressed tar stream.
///
/// Entries are appended in sorted walk order so the same tree state always
/// produces the same archive. Symlinks are stored as links, not followed.
/// `level` is the zstd compression level (0–9; 0 selects the library
/// default).
pub fn pack_tree<W: Write>(src: &Path, level: i32, out: W) -> Result<()> {
    let encoder = zstd::stream::Encoder::new(out, level.clamp(0, 9))
        .map_err(|e| StackupError::ArchiveAssembly(format!("zstd init: {e}")))?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for entry in walkdir::WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry =
            entry.map_err(|e| StackupError::ArchiveAssembly(format!("walk {}: {e}", src.display())))?;
        let rel = entry.path().strip_prefix(src).map_err(|e| {
            StackupError::ArchiveAssembly(format!("walk {}: {e}", src.display()))
        })?;
        if entry.file_type().is_dir() {
            builder
                .append_dir(rel, entry.path())
                .map_err(|e| StackupError::ArchiveAssembly(format!("{}: {e}", rel.display())))?;
        } else {
            builder
                .append_path_with_name(entry.path(), rel)
                .map_err(|e| StackupError::ArchiveAssembly(format!("{}: {e}", rel.display())))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| StackupError::ArchiveAssembly(format!("finish tar: {e}")))?;
    encoder
        .finish()
        .map_err(|e| StackupError::ArchiveAssembly(format!("finish zstd: {e}")))?;
    Ok(())
}

/// Unpack a zstd-compressed tar stream into `dest`.
///
/// Every entry path is checked before extraction; absolute paths and parent
/// traversal abort with an error rather than being silently skipped.
pub fn unpack_tree<R: Read>(input: R, dest: &Path) -> Result<()> {
    let decoder = zstd::stream::Decoder::new(input)
        .map_err(|e| StackupError::InvalidFormat(format!("zstd init: {e}")))?;
    let mut archive = tar::Archive::new(decoder);

    std::fs::create_dir_all(dest)?;
    for entry in archive
        .entries()
        .map_err(|e| StackupError::InvalidFormat(format!("tar read: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| StackupError::InvalidFormat(format!("tar entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| StackupError::InvalidFormat(format!("tar entry path: {e}")))?
            .into_owned();
        sanitize_entry_path(&path)?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| StackupError::InvalidFormat(format!("{}: {e}", path.display())))?;
        if !unpacked {
            warn!(path = %path.display(), "archive entry skipped during extraction");
        }
    }
    Ok(())
}

fn sanitize_entry_path(path: &Path) -> Result<()> {
    if path.is_absolute() {
        return Err(StackupError::InvalidFormat(format!(
            "refusing to extract absolute path: {}",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            return Err(StackupError::InvalidFormat(format!(
                "refusing to extract unsafe path: {}",
                path.display()
            )));
        }
    }
    Ok(())
}
