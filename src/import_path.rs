//! Import path parsing and the pinned form imports are rewritten to.

use sha2::{Digest as _, Sha256};

/// Hex characters kept from the digest when naming a renamed internal directory.
const INTERNAL_NAME_LEN: usize = 16;

/// An upstream import path split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPath<'a> {
    /// Repository owner.
    pub author: &'a str,
    /// Repository name.
    pub repo: &'a str,
    /// Remainder of the path with its leading `/`, or empty.
    pub subpath: &'a str,
}

impl<'a> ImportPath<'a> {
    /// Dependency key, `author/repo`.
    pub fn key(&self) -> String {
        return format!("{}/{}", self.author, self.repo);
    }

    /// Split `host/author/repo[/subpath]`.
    /// Returns `None` for other hosts or when author or repo is missing.
    pub fn parse(path: &'a str, upstream_host: &str) -> Option<Self> {
        let rest = path.strip_prefix(upstream_host)?.strip_prefix('/')?;
        let (author, rest) = rest.split_once('/')?;
        let (repo, subpath) = rest.find('/').map_or((rest, ""), |at| return rest.split_at(at));
        if author.is_empty() || repo.is_empty() {
            return None;
        }
        return Some(Self { author, repo, subpath });
    }

    /// The quoted literal this import is rewritten to:
    /// `"<proxy>/<author>/<repo>@<sha>[/<subpath>]"`.
    ///
    /// An `internal` segment in the subpath becomes the name that directory
    /// receives when the dependency itself is pinned at `sha`.
    pub fn pinned_literal(&self, proxy_host: &str, sha: &str, internal_dir: &str) -> String {
        let renamed = internal_dir_name(self.author, self.repo, sha);
        let subpath = rename_internal_segment(self.subpath, internal_dir, &renamed);
        return format!("\"{proxy_host}/{}/{}@{sha}{subpath}\"", self.author, self.repo);
    }
}

/// Name given to `internal` directories of `author/repo` pinned at `sha`.
/// Deterministic so importers can predict it.
pub fn internal_dir_name(author: &str, repo: &str, sha: &str) -> String {
    let digest = Sha256::digest(format!("{author}/{repo}@{sha}").as_bytes());
    return format!("{digest:x}").chars().take(INTERNAL_NAME_LEN).collect();
}

/// Replace the first `/<internal>/` segment, or a trailing `/<internal>`, with `/<renamed>`.
fn rename_internal_segment(subpath: &str, internal_dir: &str, renamed: &str) -> String {
    let inner = format!("/{internal_dir}/");
    if let Some(at) = subpath.find(&inner) {
        let (head, tail) = subpath.split_at(at);
        let tail = tail.get(inner.len()..).unwrap_or_default();
        return format!("{head}/{renamed}/{tail}");
    }
    let trailing = format!("/{internal_dir}");
    return subpath.strip_suffix(&trailing).map_or_else(
        || return subpath.to_string(),
        |head| return format!("{head}/{renamed}"),
    );
}
