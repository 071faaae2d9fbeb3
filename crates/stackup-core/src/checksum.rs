use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, StackupError};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file's contents, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 over a directory tree: a hash-of-hashes covering every
/// contained file's relative path and content hash, in stable sort order.
///
/// Symlinks contribute their link target rather than the pointed-to content,
/// so a retargeted link changes the tree hash without following it.
pub fn sha256_tree(root: &Path) -> Result<String> {
    let mut outer = Sha256::new();
    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| StackupError::Other(format!("walk {}: {e}", root.display())))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| StackupError::Other(format!("walk {}: {e}", root.display())))?;
        let rel_key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            outer.update(rel_key.as_bytes());
            outer.update(b"->");
            outer.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_file() {
            outer.update(rel_key.as_bytes());
            outer.update(sha256_file(entry.path())?.as_bytes());
        }
        // Directories contribute only through their contents.
    }
    Ok(hex::encode(outer.finalize()))
}

/// Total size in bytes of all regular files under a directory tree.
pub fn tree_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| StackupError::Other(format!("walk {}: {e}", root.display())))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}
