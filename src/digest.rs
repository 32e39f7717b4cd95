//! Deterministic digest of a source tree, used to confirm that a rewrite
//! changed what it should and that a second rewrite changes nothing.

use std::path::Path;

use sha2::{Digest as _, Sha256};
use walkdir::WalkDir;

use crate::error::Error;

/// SHA-256 over every regular file under `root`, in sorted path order.
///
/// Each file contributes its `/`-separated path relative to `root`, a NUL,
/// its length, a NUL, and its bytes. Directories and symlinks contribute
/// nothing, so the digest depends on content and layout only.
///
/// # Errors
///
/// Returns `Error::Io` if the tree cannot be walked or a file cannot be read.
pub fn tree_digest(root: &Path) -> Result<String, Error> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = relative_name(root, entry.path())?;
        let content = std::fs::read(entry.path())?;

        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(content);
    }
    return Ok(format!("{:x}", hasher.finalize()));
}

/// `path` relative to `root`, joined with `/` on every platform.
///
/// # Errors
///
/// Returns `Error::Io` if `path` does not lie under `root`.
fn relative_name(root: &Path, path: &Path) -> Result<String, Error> {
    let relative = path.strip_prefix(root).map_err(|e| {
        return std::io::Error::other(format!("{} is not under {}: {e}", path.display(), root.display()));
    })?;
    return Ok(relative
        .components()
        .map(|part| return part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"));
}
